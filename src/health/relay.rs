//! Relay node descriptors.

use std::collections::HashSet;

use url::Url;

use crate::config::RelayConfig;

/// Immutable description of one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayNode {
    /// Resource fetched through the relay when probing.
    pub probe_url: String,

    /// `scheme://host[:port]/`, prepended to a target URL to route it.
    pub prefix: String,

    pub tags: HashSet<String>,
}

impl RelayNode {
    pub fn from_config(config: &RelayConfig) -> Result<Self, url::ParseError> {
        let prefix = relay_prefix(&config.probe_url)?;
        Ok(Self {
            probe_url: config.probe_url.clone(),
            prefix,
            tags: config.tags.iter().cloned().collect(),
        })
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Build nodes for every configured relay, skipping entries that do not parse.
pub fn nodes_from_config(relays: &[RelayConfig]) -> Vec<RelayNode> {
    relays
        .iter()
        .filter_map(|relay| match RelayNode::from_config(relay) {
            Ok(node) => Some(node),
            Err(e) => {
                tracing::warn!(probe_url = %relay.probe_url, error = %e, "Skipping relay");
                None
            }
        })
        .collect()
}

/// Scheme, host and non-default port of `url`, with a trailing slash.
pub fn relay_prefix(url: &str) -> Result<String, url::ParseError> {
    let parsed = Url::parse(url)?;
    let host = parsed.host_str().ok_or(url::ParseError::EmptyHost)?;
    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}/", parsed.scheme(), host, port),
        None => format!("{}://{}/", parsed.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_relays;

    #[test]
    fn prefix_drops_default_port() {
        assert_eq!(
            relay_prefix("https://ghfast.top/https://raw.githubusercontent.com/a/b").unwrap(),
            "https://ghfast.top/"
        );
        assert_eq!(
            relay_prefix("https://relay.test:443/x").unwrap(),
            "https://relay.test/"
        );
        assert_eq!(
            relay_prefix("http://127.0.0.1:8080/x").unwrap(),
            "http://127.0.0.1:8080/"
        );
        assert!(relay_prefix("not a url").is_err());
    }

    #[test]
    fn default_relays_build_nodes() {
        let nodes = nodes_from_config(&default_relays());
        assert_eq!(nodes.len(), 5);
        assert!(nodes
            .iter()
            .any(|n| n.prefix == "https://fb.xuolu.com/" && n.has_tag("short-cache")));
    }
}
