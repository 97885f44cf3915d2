//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the accelerator.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the acceleration layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccelConfig {
    /// Feature gates owned by the host; never persisted here.
    pub features: FeatureFlags,

    /// Relay nodes probed and used for rewriting.
    pub relays: Vec<RelayConfig>,

    /// Relay health probing.
    pub probe: ProbeConfig,

    /// Relay selection tuning.
    pub selection: SelectionConfig,

    /// Connection racing.
    pub connect: ConnectConfig,

    /// Address resolution policy.
    pub dns: DnsConfig,

    /// Response cache.
    pub cache: CacheConfig,

    /// Request handling policy.
    pub handler: HandlerConfig,

    /// Description localization.
    pub localization: LocalizationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// The three host-facing feature toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Route upstream traffic through relays.
    pub accelerated_relay: bool,

    /// Serve repeated GETs from the response cache.
    pub response_cache: bool,

    /// Rewrite first-party plugin descriptions.
    pub localized_descriptions: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            accelerated_relay: true,
            response_cache: true,
            localized_descriptions: true,
        }
    }
}

/// A relay node definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// URL fetched through the relay to measure it. The relay prefix is
    /// derived from its scheme, host and port.
    pub probe_url: String,

    /// Routing classes, e.g. "short-cache".
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RelayConfig {
    fn new(probe_url: &str, tag: &str) -> Self {
        Self {
            probe_url: probe_url.to_string(),
            tags: vec![tag.to_string()],
        }
    }
}

const PROBE_BLOB: &str = "https://github.com/decorwdyun/DalamudPlugins/blob/main/FastDalamudCN/random.bin";
const PROBE_RAW: &str = "https://raw.githubusercontent.com/decorwdyun/DalamudPlugins/main/FastDalamudCN/random.bin";

/// The relays shipped with the add-on.
pub fn default_relays() -> Vec<RelayConfig> {
    vec![
        RelayConfig::new(&format!("https://gh-proxy.org/{}", PROBE_BLOB), "cloudflare"),
        RelayConfig::new(&format!("https://hk.gh-proxy.org/{}", PROBE_BLOB), "standard"),
        RelayConfig::new(&format!("https://edgeone.gh-proxy.org/{}", PROBE_BLOB), "standard"),
        RelayConfig::new(&format!("https://ghfast.top/{}", PROBE_RAW), "standard"),
        RelayConfig::new(&format!("https://fb.xuolu.com/{}", PROBE_BLOB), "short-cache"),
    ]
}

/// Relay probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Interval between scheduled probe cycles in seconds.
    pub interval_secs: u64,

    /// Ceiling for a whole probe cycle in seconds.
    pub cycle_timeout_secs: u64,

    /// Timeout for a single probe request in seconds.
    pub request_timeout_secs: u64,

    /// Probe attempts per relay and cycle.
    pub attempts: u32,

    /// Lowercase hex SHA-256 of the probe payload.
    pub expected_sha256: String,

    /// Consecutive request failures that trigger an out-of-band cycle.
    pub max_error_count: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            cycle_timeout_secs: 30,
            request_timeout_secs: 10,
            attempts: 2,
            expected_sha256: "1a17f2c74ee9a1c22cb0f04bee90902e0e0c5b1fa739fd3957fcee4f42365c27"
                .to_string(),
            max_error_count: 10,
        }
    }
}

/// Relay selection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Latency band above the fastest relay treated as a tie.
    pub tie_break_window_ms: u64,

    /// Latency at or above which a relay counts as dead.
    pub dead_latency_ms: u64,

    /// Target suffix that marks an archive download.
    pub archive_suffix: String,

    /// Tag preferred for archive downloads.
    pub archive_tag: String,

    /// Relays raced concurrently for tracked repository URLs.
    pub race_candidates: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            tie_break_window_ms: 120,
            dead_latency_ms: 15_000,
            archive_suffix: ".zip".to_string(),
            archive_tag: "short-cache".to_string(),
            race_candidates: 3,
        }
    }
}

/// Connection racing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Stagger between consecutive address attempts in milliseconds.
    pub backoff_step_ms: u64,

    /// Timeout of a single connection attempt in milliseconds.
    pub attempt_timeout_ms: u64,

    /// How long a failed address stays deprioritized, in seconds.
    pub penalty_secs: u64,

    /// Idle pooled connection lifetime in seconds.
    pub pool_idle_secs: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            backoff_step_ms: 100,
            attempt_timeout_ms: 3000,
            penalty_secs: 60,
            pool_idle_secs: 60,
        }
    }
}

/// Address resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Only use IPv4 results.
    pub ipv4_only: bool,

    /// Host whose first address replaces the first result when every
    /// result belongs to `edge_ranges`.
    pub override_host: Option<String>,

    /// CIDR blocks of the edge network to route around.
    pub edge_ranges: Vec<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            ipv4_only: true,
            override_host: Some("cf-cname.xingpingcn.top".to_string()),
            edge_ranges: [
                "173.245.48.0/20",
                "103.21.244.0/22",
                "103.22.200.0/22",
                "103.31.4.0/22",
                "141.101.64.0/18",
                "108.162.192.0/18",
                "190.93.240.0/20",
                "188.114.96.0/20",
                "197.234.240.0/22",
                "198.41.128.0/17",
                "162.158.0.0/15",
                "104.16.0.0/13",
                "104.24.0.0/14",
                "172.64.0.0/13",
                "131.0.72.0/22",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Reads allowed per cached entry before it is evicted.
    pub max_usage_count: u32,

    /// TTL for relay-eligible upstream URLs in seconds.
    pub upstream_ttl_secs: u64,

    /// TTL for everything else in seconds.
    pub default_ttl_secs: u64,

    /// Timeout for buffering a body into the cache in seconds.
    pub read_timeout_secs: u64,

    /// Artificial delay applied to cache hits in milliseconds.
    pub hit_delay_ms: u64,

    /// Largest body that will be buffered.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_usage_count: 4,
            upstream_ttl_secs: 15 * 60,
            default_ttl_secs: 5 * 60,
            read_timeout_secs: 10,
            hit_delay_ms: 120,
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Request handling policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// User-Agent attached to outgoing requests that carry none.
    pub user_agent: String,

    /// Official repository prefix whose failures are answered with an
    /// empty listing.
    pub official_repo_prefix: String,

    /// URL prefixes of the blocked upstream that relays can serve.
    pub upstream_prefixes: Vec<String>,

    /// Wall-clock budget for tracked repository requests in seconds.
    pub tracked_budget_secs: u64,

    /// Upper bound of a single tracked attempt in seconds.
    pub tracked_attempt_secs: u64,

    /// Attempts for tracked repository requests.
    pub tracked_attempts: u32,

    /// Timeout of one transport send in seconds.
    pub request_timeout_secs: u64,

    /// Largest request body that will be buffered for cloning.
    pub max_request_body_bytes: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("relay-accel/{}", env!("CARGO_PKG_VERSION")),
            official_repo_prefix: "https://aonyx.ffxiv.wang/Plugin/PluginMaster".to_string(),
            upstream_prefixes: vec![
                "https://raw.githubusercontent.com".to_string(),
                "https://github.com".to_string(),
                "https://gist.github.com".to_string(),
            ],
            tracked_budget_secs: 11,
            tracked_attempt_secs: 5,
            tracked_attempts: 2,
            request_timeout_secs: 10,
            max_request_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Description localization configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LocalizationConfig {
    /// JSON file with translations keyed by plugin internal name.
    pub translations_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Status endpoint bind address.
    pub status_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
            status_address: "127.0.0.1:8081".to_string(),
        }
    }
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            features: FeatureFlags::default(),
            relays: default_relays(),
            probe: ProbeConfig::default(),
            selection: SelectionConfig::default(),
            connect: ConnectConfig::default(),
            dns: DnsConfig::default(),
            cache: CacheConfig::default(),
            handler: HandlerConfig::default(),
            localization: LocalizationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
