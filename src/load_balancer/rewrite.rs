//! Relay URL construction.
//!
//! A relay is addressed by prepending its prefix to the full upstream URL:
//! `https://relay.example/` + `https://raw.githubusercontent.com/x/y/main/z`.

use std::collections::HashSet;
use std::sync::Arc;

use http::Uri;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::config::SharedFeatures;
use crate::load_balancer::selector::RelaySelector;
use crate::routing::matcher::{Matcher, PrefixMatcher};

const RAW_HOST: &str = "raw.githubusercontent.com";

static RAW_BRANCH_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/([^/]+)/([^/]+)/refs/heads/([^/]+)(.*)$").expect("invalid raw branch regex")
});

/// Drop `refs/heads/` from raw content URLs; relays only understand the
/// short `owner/repo/branch/path` form.
pub fn normalize_raw_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if !parsed
        .host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case(RAW_HOST))
    {
        return url.to_string();
    }

    let short = RAW_BRANCH_PATH
        .captures(parsed.path())
        .map(|c| format!("/{}/{}/{}{}", &c[1], &c[2], &c[3], &c[4]));
    match short {
        Some(path) => {
            parsed.set_path(&path);
            parsed.to_string()
        }
        None => url.to_string(),
    }
}

/// Relay URI for `url` through `prefix`.
pub fn relay_target(prefix: &str, url: &str) -> Option<Uri> {
    format!("{}{}", prefix, normalize_raw_url(url)).parse().ok()
}

/// Gates relay substitution on the feature flag and the upstream matcher.
pub struct RelayRewriter {
    selector: Arc<RelaySelector>,
    upstream: PrefixMatcher,
    features: SharedFeatures,
}

impl RelayRewriter {
    pub fn new(selector: Arc<RelaySelector>, upstream: PrefixMatcher, features: SharedFeatures) -> Self {
        Self {
            selector,
            upstream,
            features,
        }
    }

    /// True if `url` belongs to the upstream relays can serve.
    pub fn is_upstream(&self, url: &str) -> bool {
        self.upstream.matches(url)
    }

    pub fn applies(&self, url: &str) -> bool {
        self.features.load().accelerated_relay && self.is_upstream(url)
    }

    /// Best relay URI for `url`, or `None` when relaying does not apply.
    pub fn relay_uri(&self, url: &str, excluded: &mut HashSet<String>) -> Option<Uri> {
        if !self.applies(url) {
            return None;
        }
        let prefix = self.selector.pick(url, excluded)?;
        relay_target(&prefix, url)
    }

    /// Up to `count` relay URIs, fastest relay first.
    pub fn relay_uris(&self, url: &str, count: usize, excluded: &mut HashSet<String>) -> Vec<Uri> {
        if !self.applies(url) {
            return Vec::new();
        }
        self.selector
            .pick_many(url, count, excluded)
            .iter()
            .filter_map(|prefix| relay_target(prefix, url))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{shared_features, FeatureFlags, SelectionConfig};
    use crate::health::latency::LatencyTable;
    use crate::health::relay::RelayNode;

    #[test]
    fn raw_branch_refs_are_shortened() {
        assert_eq!(
            normalize_raw_url("https://raw.githubusercontent.com/x/y/refs/heads/main/z"),
            "https://raw.githubusercontent.com/x/y/main/z"
        );
        assert_eq!(
            normalize_raw_url("https://raw.githubusercontent.com/x/y/refs/heads/dev/dir/repo.json?v=2"),
            "https://raw.githubusercontent.com/x/y/dev/dir/repo.json?v=2"
        );
    }

    #[test]
    fn other_urls_are_untouched() {
        for url in [
            "https://raw.githubusercontent.com/x/y/main/z",
            "https://github.com/x/y/refs/heads/main/z",
            "not a url",
        ] {
            assert_eq!(normalize_raw_url(url), url);
        }
    }

    #[test]
    fn relay_target_concatenates() {
        let uri = relay_target(
            "https://relay.test/",
            "https://raw.githubusercontent.com/x/y/refs/heads/main/z",
        )
        .unwrap();
        assert_eq!(
            uri.to_string(),
            "https://relay.test/https://raw.githubusercontent.com/x/y/main/z"
        );
    }

    fn rewriter(flags: FeatureFlags) -> RelayRewriter {
        let nodes = vec![RelayNode {
            probe_url: "https://relay.test/probe".into(),
            prefix: "https://relay.test/".into(),
            tags: Default::default(),
        }];
        let table = Arc::new(LatencyTable::new(&nodes));
        table.record("https://relay.test/", 50);
        let selector = Arc::new(RelaySelector::new(nodes, table, &SelectionConfig::default()));
        RelayRewriter::new(
            selector,
            PrefixMatcher::new(["https://raw.githubusercontent.com", "https://github.com"]),
            shared_features(flags),
        )
    }

    #[test]
    fn rewrites_only_enabled_upstream_urls() {
        let r = rewriter(FeatureFlags::default());
        assert!(r
            .relay_uri("https://github.com/a/b/latest.zip", &mut HashSet::new())
            .is_some());
        assert!(r
            .relay_uri("https://example.com/a.json", &mut HashSet::new())
            .is_none());

        let off = rewriter(FeatureFlags {
            accelerated_relay: false,
            ..FeatureFlags::default()
        });
        assert!(off
            .relay_uri("https://github.com/a/b/latest.zip", &mut HashSet::new())
            .is_none());
        assert!(off
            .relay_uris("https://github.com/a/b/latest.zip", 3, &mut HashSet::new())
            .is_empty());
    }
}
