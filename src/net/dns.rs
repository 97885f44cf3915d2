//! Address resolution with family interleaving and edge-network substitution.
//!
//! # Responsibilities
//! - Resolve a hostname through a pluggable resolver
//! - Interleave address families (zipper merge) in discovery order
//! - Replace the first address when every result sits inside the
//!   configured edge-network blocks and an override host resolves
//!
//! # Design Decisions
//! - The override lookup is best effort: any failure leaves the list as is
//! - IP literals are returned without any lookup

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::DnsConfig;

/// Name resolution seam. `SystemResolver` is the production implementation.
pub trait Resolve: Send + Sync + 'static {
    /// Resolve `host` to addresses in the order the resolver returned them.
    fn lookup(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>>;
}

/// Resolver backed by the operating system via Tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn lookup(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
        let host = host.to_string();
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let mut out: Vec<IpAddr> = Vec::new();
            for addr in addrs {
                if !out.contains(&addr.ip()) {
                    out.push(addr.ip());
                }
            }
            Ok(out)
        })
    }
}

/// An IPv4 CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: u32,
    mask: u32,
}

impl CidrRange {
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        let mask = if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_len.min(32)))
        };
        Self {
            network: u32::from(addr) & mask,
            mask,
        }
    }

    /// True if `ip` is an IPv4 address inside this block.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => u32::from(*v4) & self.mask == self.network,
            IpAddr::V6(_) => false,
        }
    }
}

impl FromStr for CidrRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not in address/prefix form", s))?;
        let addr: Ipv4Addr = addr
            .trim()
            .parse()
            .map_err(|e| format!("invalid address in '{}': {}", s, e))?;
        let len: u8 = len
            .trim()
            .parse()
            .map_err(|e| format!("invalid prefix in '{}': {}", s, e))?;
        if len > 32 {
            return Err(format!("prefix of '{}' exceeds 32", s));
        }
        Ok(Self::new(addr, len))
    }
}

/// Round-robin across groups, preserving each group's internal order.
pub fn zipper_merge<T: Clone>(groups: &[Vec<T>]) -> Vec<T> {
    let total = groups.iter().map(Vec::len).sum();
    let longest = groups.iter().map(Vec::len).max().unwrap_or(0);
    let mut merged = Vec::with_capacity(total);
    for i in 0..longest {
        for group in groups {
            if let Some(item) = group.get(i) {
                merged.push(item.clone());
            }
        }
    }
    merged
}

/// Orders resolved addresses for connection racing.
pub struct DnsPreference {
    resolver: Arc<dyn Resolve>,
    ipv4_only: bool,
    override_host: Option<String>,
    edge_ranges: Vec<CidrRange>,
}

impl DnsPreference {
    pub fn new(resolver: Arc<dyn Resolve>, config: &DnsConfig) -> Self {
        let edge_ranges = config
            .edge_ranges
            .iter()
            .filter_map(|r| match r.parse() {
                Ok(range) => Some(range),
                Err(e) => {
                    tracing::warn!(range = %r, error = %e, "Ignoring invalid edge range");
                    None
                }
            })
            .collect();

        Self {
            resolver,
            ipv4_only: config.ipv4_only,
            override_host: config.override_host.clone().filter(|h| !h.is_empty()),
            edge_ranges,
        }
    }

    fn is_edge(&self, ip: &IpAddr) -> bool {
        self.edge_ranges.iter().any(|r| r.contains(ip))
    }

    async fn lookup_filtered(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let mut addrs = self.resolver.lookup(host).await?;
        if self.ipv4_only {
            addrs.retain(IpAddr::is_ipv4);
        }
        Ok(addrs)
    }

    /// Resolve `host` to an ordered address list.
    pub async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let mut addrs = self.lookup_filtered(host).await?;

        if let Some(override_host) = &self.override_host {
            if !addrs.is_empty() && addrs.iter().all(|ip| self.is_edge(ip)) {
                match self.lookup_filtered(override_host).await {
                    Ok(replacement) => match replacement.first() {
                        Some(first) => addrs[0] = *first,
                        None => tracing::warn!(
                            host = %host,
                            override_host = %override_host,
                            "Override host resolved to no addresses"
                        ),
                    },
                    Err(e) => tracing::warn!(
                        host = %host,
                        override_host = %override_host,
                        error = %e,
                        "Failed to resolve override host"
                    ),
                }
            }
        }

        // Group by family in discovery order.
        let mut order: Vec<bool> = Vec::new();
        let mut groups: HashMap<bool, Vec<IpAddr>> = HashMap::new();
        for ip in addrs {
            let v4 = ip.is_ipv4();
            if !order.contains(&v4) {
                order.push(v4);
            }
            groups.entry(v4).or_default().push(ip);
        }
        let groups: Vec<Vec<IpAddr>> = order
            .iter()
            .filter_map(|family| groups.remove(family))
            .collect();

        let merged = zipper_merge(&groups);
        tracing::trace!(host = %host, addresses = ?merged, "Resolved");
        Ok(merged)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Resolver answering from a fixed table.
    #[derive(Default)]
    pub(crate) struct StaticResolver {
        pub entries: Mutex<HashMap<String, io::Result<Vec<IpAddr>>>>,
    }

    impl StaticResolver {
        pub(crate) fn with(mut self, host: &str, addrs: &[&str]) -> Self {
            let ips = addrs.iter().map(|a| a.parse().unwrap()).collect();
            self.entries.get_mut().unwrap().insert(host.to_string(), Ok(ips));
            self
        }

        pub(crate) fn failing(mut self, host: &str) -> Self {
            self.entries.get_mut().unwrap().insert(
                host.to_string(),
                Err(io::Error::new(io::ErrorKind::NotFound, "no such host")),
            );
            self
        }
    }

    impl Resolve for StaticResolver {
        fn lookup(&self, host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
            let result = match self.entries.lock().unwrap().get(host) {
                Some(Ok(ips)) => Ok(ips.clone()),
                Some(Err(e)) => Err(io::Error::new(e.kind(), e.to_string())),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "unknown host")),
            };
            Box::pin(async move { result })
        }
    }

    fn config(ipv4_only: bool) -> DnsConfig {
        DnsConfig {
            ipv4_only,
            ..DnsConfig::default()
        }
    }

    #[test]
    fn cidr_matching() {
        let range: CidrRange = "104.16.0.0/13".parse().unwrap();
        assert!(range.contains(&"104.16.1.1".parse().unwrap()));
        assert!(range.contains(&"104.23.255.255".parse().unwrap()));
        assert!(!range.contains(&"104.24.0.1".parse().unwrap()));
        assert!(!range.contains(&"::1".parse().unwrap()));
        assert!("1.2.3.4".parse::<CidrRange>().is_err());
        assert!("1.2.3.4/33".parse::<CidrRange>().is_err());
    }

    #[test]
    fn zipper_merge_alternates() {
        let merged = zipper_merge(&[vec![1, 2, 3], vec![10, 20]]);
        assert_eq!(merged, vec![1, 10, 2, 20, 3]);
        assert!(zipper_merge::<u8>(&[]).is_empty());
    }

    #[tokio::test]
    async fn interleaves_families() {
        let resolver = StaticResolver::default().with(
            "dual.example",
            &["2001:db8::1", "2001:db8::2", "192.0.2.1", "192.0.2.2"],
        );
        let dns = DnsPreference::new(Arc::new(resolver), &config(false));
        let addrs = dns.resolve("dual.example").await.unwrap();
        let expected: Vec<IpAddr> = ["2001:db8::1", "192.0.2.1", "2001:db8::2", "192.0.2.2"]
            .iter()
            .map(|a| a.parse().unwrap())
            .collect();
        assert_eq!(addrs, expected);
    }

    #[tokio::test]
    async fn ipv4_only_drops_v6() {
        let resolver = StaticResolver::default()
            .with("dual.example", &["2001:db8::1", "192.0.2.1"]);
        let dns = DnsPreference::new(Arc::new(resolver), &config(true));
        let addrs = dns.resolve("dual.example").await.unwrap();
        assert_eq!(addrs, vec!["192.0.2.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn edge_addresses_get_override() {
        let resolver = StaticResolver::default()
            .with("edge.example", &["104.16.0.1", "104.16.0.2"])
            .with("cf-cname.xingpingcn.top", &["198.51.100.7"]);
        let dns = DnsPreference::new(Arc::new(resolver), &config(true));
        let addrs = dns.resolve("edge.example").await.unwrap();
        assert_eq!(addrs[0], "198.51.100.7".parse::<IpAddr>().unwrap());
        assert_eq!(addrs[1], "104.16.0.2".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn mixed_addresses_are_left_alone() {
        let resolver = StaticResolver::default()
            .with("mixed.example", &["104.16.0.1", "192.0.2.1"])
            .with("cf-cname.xingpingcn.top", &["198.51.100.7"]);
        let dns = DnsPreference::new(Arc::new(resolver), &config(true));
        let addrs = dns.resolve("mixed.example").await.unwrap();
        assert_eq!(addrs[0], "104.16.0.1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn override_failure_is_swallowed() {
        let resolver = StaticResolver::default()
            .with("edge.example", &["104.16.0.1"])
            .failing("cf-cname.xingpingcn.top");
        let dns = DnsPreference::new(Arc::new(resolver), &config(true));
        let addrs = dns.resolve("edge.example").await.unwrap();
        assert_eq!(addrs, vec!["104.16.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn literals_skip_lookup() {
        let dns = DnsPreference::new(Arc::new(StaticResolver::default()), &config(true));
        assert_eq!(
            dns.resolve("127.0.0.1").await.unwrap(),
            vec!["127.0.0.1".parse::<IpAddr>().unwrap()]
        );
        assert_eq!(
            dns.resolve("[::1]").await.unwrap(),
            vec!["::1".parse::<IpAddr>().unwrap()]
        );
    }
}
