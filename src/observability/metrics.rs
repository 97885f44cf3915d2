//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_accel_requests_total` (counter): handled requests by outcome
//! - `relay_accel_cache_lookups_total` (counter): cache lookups by result
//! - `relay_accel_races_total` (counter): relay races by outcome
//! - `relay_accel_relay_latency_ms` (gauge): last probed latency per relay,
//!   -1 when unreachable
//! - `relay_accel_probe_cycles_total` (counter): completed probe cycles
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed
//! - `AccelStats` keeps the user-facing counter independent of any exporter

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Counters shown to the user interface.
#[derive(Debug, Default)]
pub struct AccelStats {
    accelerated: AtomicU64,
}

impl AccelStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request served through a relay or from an upstream cache hit.
    pub fn record_accelerated(&self) {
        self.accelerated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accelerated(&self) -> u64 {
        self.accelerated.load(Ordering::Relaxed)
    }
}

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("relay_accel_requests_total", "Requests handled, by outcome");
    describe_counter!(
        "relay_accel_cache_lookups_total",
        "Response cache lookups, by result"
    );
    describe_counter!("relay_accel_races_total", "Relay races, by outcome");
    describe_gauge!(
        "relay_accel_relay_latency_ms",
        "Last verified probe latency per relay (-1 = unreachable)"
    );
    describe_counter!(
        "relay_accel_probe_cycles_total",
        "Completed relay probe cycles"
    );
}

pub fn record_request(outcome: &'static str) {
    counter!("relay_accel_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("relay_accel_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_race(outcome: &'static str) {
    counter!("relay_accel_races_total", "outcome" => outcome).increment(1);
}

pub fn record_relay_latency(relay: &str, latency_ms: Option<u64>) {
    let value = latency_ms.map(|ms| ms as f64).unwrap_or(-1.0);
    gauge!("relay_accel_relay_latency_ms", "relay" => relay.to_string()).set(value);
}

pub fn record_probe_cycle() {
    counter!("relay_accel_probe_cycles_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accelerated_counter_accumulates() {
        let stats = AccelStats::new();
        stats.record_accelerated();
        stats.record_accelerated();
        assert_eq!(stats.accelerated(), 2);
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_request("success");
        record_cache_lookup(true);
        record_race("won");
        record_relay_latency("https://relay.test/", None);
        record_probe_cycle();
    }
}
