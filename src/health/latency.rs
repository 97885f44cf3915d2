//! Process-wide relay latency table.
//!
//! Written only by the probe, read by the selector and the status surface.
//! Every known prefix has an entry from construction on; entries are
//! overwritten, never removed.

use dashmap::DashMap;

use crate::health::relay::RelayNode;

/// Marker for a relay with no verified probe.
pub const UNREACHABLE: u64 = u64::MAX;

#[derive(Debug, Default)]
pub struct LatencyTable {
    entries: DashMap<String, u64>,
}

impl LatencyTable {
    pub fn new(nodes: &[RelayNode]) -> Self {
        let entries = DashMap::new();
        for node in nodes {
            entries.insert(node.prefix.clone(), UNREACHABLE);
        }
        Self { entries }
    }

    /// Latency of `prefix` in milliseconds, `UNREACHABLE` when unknown.
    pub fn latency_of(&self, prefix: &str) -> u64 {
        self.entries.get(prefix).map(|e| *e).unwrap_or(UNREACHABLE)
    }

    pub fn record(&self, prefix: &str, latency_ms: u64) {
        self.entries.insert(prefix.to_string(), latency_ms);
    }

    /// Copy of all entries ordered by latency, unreachable as `None`.
    pub fn snapshot(&self) -> Vec<(String, Option<u64>)> {
        let mut rows: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        rows.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        rows.into_iter()
            .map(|(prefix, ms)| (prefix, (ms != UNREACHABLE).then_some(ms)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
