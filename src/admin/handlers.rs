use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::StatusState;
use crate::config::FeatureFlags;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub accelerated_requests: u64,
    pub cached_entries: usize,
    pub tracked_repositories: usize,
    pub features: FeatureFlags,
}

#[derive(Debug, Serialize)]
pub struct RelayStatus {
    pub prefix: String,
    /// `null` while the relay has no verified probe.
    pub latency_ms: Option<u64>,
}

pub async fn get_status(State(state): State<StatusState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        accelerated_requests: state.stats.accelerated(),
        cached_entries: state.cache.len(),
        tracked_repositories: state.registry.len(),
        features: **state.features.load(),
    })
}

pub async fn get_relays(State(state): State<StatusState>) -> Json<Vec<RelayStatus>> {
    Json(
        state
            .table
            .snapshot()
            .into_iter()
            .map(|(prefix, latency_ms)| RelayStatus { prefix, latency_ms })
            .collect(),
    )
}
