//! Latency-aware relay selection.
//!
//! # Responsibilities
//! - Drop excluded and dead relays
//! - Prefer archive-tagged relays for archive targets, falling back to all
//! - Pick uniformly among relays within the tie-break window of the fastest
//!
//! # Design Decisions
//! - Random choice inside the window spreads load over equally good relays
//! - Every returned prefix is added to `excluded` so successive calls diversify

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::config::SelectionConfig;
use crate::health::latency::LatencyTable;
use crate::health::relay::RelayNode;
use crate::routing::matcher::{Matcher, SuffixMatcher};

pub struct RelaySelector {
    nodes: Vec<RelayNode>,
    table: Arc<LatencyTable>,
    archive: SuffixMatcher,
    archive_tag: String,
    tie_break_window_ms: u64,
    dead_latency_ms: u64,
}

impl RelaySelector {
    pub fn new(nodes: Vec<RelayNode>, table: Arc<LatencyTable>, config: &SelectionConfig) -> Self {
        Self {
            nodes,
            table,
            archive: SuffixMatcher::new(config.archive_suffix.as_str()),
            archive_tag: config.archive_tag.clone(),
            tie_break_window_ms: config.tie_break_window_ms,
            dead_latency_ms: config.dead_latency_ms,
        }
    }

    fn eligible(&self, target: &str, excluded: &HashSet<String>) -> Vec<(&RelayNode, u64)> {
        let alive: Vec<(&RelayNode, u64)> = self
            .nodes
            .iter()
            .filter(|node| !excluded.contains(&node.prefix))
            .map(|node| (node, self.table.latency_of(&node.prefix)))
            .filter(|(_, latency)| *latency < self.dead_latency_ms)
            .collect();

        if self.archive.matches(target) {
            let preferred: Vec<(&RelayNode, u64)> = alive
                .iter()
                .filter(|(node, _)| node.has_tag(&self.archive_tag))
                .copied()
                .collect();
            if !preferred.is_empty() {
                return preferred;
            }
        }
        alive
    }

    /// One relay prefix for `target`, or `None` when no relay is usable.
    pub fn pick(&self, target: &str, excluded: &mut HashSet<String>) -> Option<String> {
        let pool = self.eligible(target, excluded);
        let fastest = pool.iter().map(|(_, latency)| *latency).min()?;
        let ceiling = fastest.saturating_add(self.tie_break_window_ms);
        let ties: Vec<(&RelayNode, u64)> = pool
            .into_iter()
            .filter(|(_, latency)| *latency <= ceiling)
            .collect();

        let (node, latency) = ties.choose(&mut rand::thread_rng())?;
        tracing::trace!(
            url = %target,
            relay = %node.prefix,
            latency_ms = latency,
            ties = ties.len(),
            "Relay picked"
        );
        excluded.insert(node.prefix.clone());
        Some(node.prefix.clone())
    }

    /// Up to `count` relay prefixes, fastest first.
    pub fn pick_many(
        &self,
        target: &str,
        count: usize,
        excluded: &mut HashSet<String>,
    ) -> Vec<String> {
        let mut pool = self.eligible(target, excluded);
        pool.sort_by_key(|(_, latency)| *latency);
        let picked: Vec<String> = pool
            .into_iter()
            .take(count)
            .map(|(node, _)| node.prefix.clone())
            .collect();
        excluded.extend(picked.iter().cloned());
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(prefix: &str, tags: &[&str]) -> RelayNode {
        RelayNode {
            probe_url: format!("{}probe", prefix),
            prefix: prefix.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn selector(rows: &[(&str, &[&str], Option<u64>)]) -> RelaySelector {
        let nodes: Vec<RelayNode> = rows.iter().map(|(p, tags, _)| node(p, tags)).collect();
        let table = Arc::new(LatencyTable::new(&nodes));
        for (prefix, _, latency) in rows {
            if let Some(ms) = latency {
                table.record(prefix, *ms);
            }
        }
        RelaySelector::new(nodes, table, &SelectionConfig::default())
    }

    const JSON: &str = "https://raw.githubusercontent.com/a/b/main/repo.json";
    const ZIP: &str = "https://github.com/a/b/releases/download/v1/latest.zip";

    #[test]
    fn pick_stays_within_tie_window() {
        let s = selector(&[
            ("https://a/", &[], Some(100)),
            ("https://b/", &[], Some(180)),
            ("https://c/", &[], Some(220)),
            ("https://d/", &[], Some(221)),
            ("https://e/", &[], Some(900)),
        ]);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let picked = s.pick(JSON, &mut HashSet::new()).unwrap();
            assert!(
                ["https://a/", "https://b/", "https://c/"].contains(&picked.as_str()),
                "picked {} outside the window",
                picked
            );
            seen.insert(picked);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn dead_and_excluded_relays_are_skipped() {
        let s = selector(&[
            ("https://dead/", &[], Some(15_000)),
            ("https://unknown/", &[], None),
            ("https://used/", &[], Some(10)),
            ("https://ok/", &[], Some(400)),
        ]);
        let mut excluded: HashSet<String> = ["https://used/".to_string()].into();
        assert_eq!(s.pick(JSON, &mut excluded).as_deref(), Some("https://ok/"));
        assert!(excluded.contains("https://ok/"));
        assert_eq!(s.pick(JSON, &mut excluded), None);
    }

    #[test]
    fn archives_prefer_short_cache_relays() {
        let s = selector(&[
            ("https://fast/", &["standard"], Some(20)),
            ("https://fresh/", &["short-cache"], Some(700)),
        ]);
        for _ in 0..50 {
            assert_eq!(
                s.pick(ZIP, &mut HashSet::new()).as_deref(),
                Some("https://fresh/")
            );
        }
        assert_eq!(s.pick(JSON, &mut HashSet::new()).as_deref(), Some("https://fast/"));
    }

    #[test]
    fn archives_fall_back_when_short_cache_is_dead() {
        let s = selector(&[
            ("https://fast/", &["standard"], Some(20)),
            ("https://fresh/", &["short-cache"], None),
        ]);
        assert_eq!(s.pick(ZIP, &mut HashSet::new()).as_deref(), Some("https://fast/"));
    }

    #[test]
    fn pick_many_orders_by_latency_and_diversifies() {
        let s = selector(&[
            ("https://c/", &[], Some(300)),
            ("https://a/", &[], Some(100)),
            ("https://b/", &[], Some(200)),
            ("https://d/", &[], None),
        ]);
        let mut excluded = HashSet::new();
        assert_eq!(
            s.pick_many(JSON, 2, &mut excluded),
            vec!["https://a/".to_string(), "https://b/".to_string()]
        );
        assert_eq!(s.pick_many(JSON, 2, &mut excluded), vec!["https://c/".to_string()]);
        assert!(s.pick_many(JSON, 2, &mut excluded).is_empty());
    }
}
