//! URL matching.
//!
//! # Responsibilities
//! - Match target URLs by prefix (upstream hosts, official repository)
//! - Match target paths by suffix (archives, images)
//! - Reject hosts that cannot possibly resolve
//!
//! # Design Decisions
//! - Matching is ASCII case-insensitive
//! - Suffixes are matched against the URL without its query string
//! - No regex to guarantee O(n) matching

use std::fmt;
use std::net::IpAddr;

/// Trait for matching target URLs against conditions.
pub trait Matcher: Send + Sync + fmt::Debug {
    fn matches(&self, url: &str) -> bool;
}

/// Matches URLs starting with any of the configured prefixes.
#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefixes: Vec<String>,
}

impl PrefixMatcher {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.into().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

impl Matcher for PrefixMatcher {
    fn matches(&self, url: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            url.len() >= prefix.len()
                && url.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
        })
    }
}

/// Matches URLs whose path ends with the suffix.
#[derive(Debug, Clone)]
pub struct SuffixMatcher {
    suffix: String,
}

impl SuffixMatcher {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into().to_ascii_lowercase(),
        }
    }
}

impl Matcher for SuffixMatcher {
    fn matches(&self, url: &str) -> bool {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        !self.suffix.is_empty()
            && path.len() >= self.suffix.len()
            && path.as_bytes()[path.len() - self.suffix.len()..]
                .eq_ignore_ascii_case(self.suffix.as_bytes())
    }
}

/// `localhost`, an IP literal, or a dotted name.
pub fn looks_resolvable(host: &str) -> bool {
    let host = host.trim_matches(|c| c == '[' || c == ']');
    !host.is_empty()
        && (host.eq_ignore_ascii_case("localhost")
            || host.parse::<IpAddr>().is_ok()
            || host.contains('.'))
}
