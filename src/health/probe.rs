//! Relay health probing.
//!
//! # Responsibilities
//! - Fetch a fixed payload through every relay and time it
//! - Accept a timing only when the payload digest matches
//! - Keep the latency table current on a schedule and on demand
//!
//! # Design Decisions
//! - A single-permit semaphore coalesces overlapping cycles: a second
//!   caller returns immediately instead of waiting
//! - All relays of a cycle are probed concurrently under one deadline
//! - A relay with no verified attempt is written as unreachable

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use futures_util::future::join_all;
use http::header::USER_AGENT;
use http::{Request, StatusCode};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{ProbeConfig, SharedFeatures};
use crate::error::TransportError;
use crate::health::latency::{LatencyTable, UNREACHABLE};
use crate::health::relay::RelayNode;
use crate::http::transport::Transport;
use crate::observability::metrics;

const PROBE_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Result of one `check_all` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { verified: usize, total: usize },
    /// Acceleration is off and the check was not forced.
    Disabled,
    /// Another cycle holds the gate.
    AlreadyRunning,
}

#[derive(Debug, Error)]
enum ProbeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("relay answered {0}")]
    Status(StatusCode),

    #[error("empty payload")]
    Empty,

    #[error("failed to read payload: {0}")]
    Body(String),

    #[error("payload digest {actual} does not match")]
    IntegrityMismatch { actual: String },

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid probe request: {0}")]
    Request(String),
}

pub struct RelayHealthProbe {
    nodes: Vec<RelayNode>,
    table: Arc<LatencyTable>,
    transport: Arc<dyn Transport>,
    features: SharedFeatures,
    gate: Semaphore,
    user_agent: String,
    attempts: u32,
    request_timeout: Duration,
    cycle_timeout: Duration,
    interval: Duration,
    expected_sha256: String,
    shutdown: CancellationToken,
}

impl RelayHealthProbe {
    pub fn new(
        nodes: Vec<RelayNode>,
        table: Arc<LatencyTable>,
        transport: Arc<dyn Transport>,
        features: SharedFeatures,
        config: &ProbeConfig,
        user_agent: &str,
    ) -> Self {
        Self {
            nodes,
            table,
            transport,
            features,
            gate: Semaphore::new(1),
            user_agent: user_agent.to_string(),
            attempts: config.attempts.max(1),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            cycle_timeout: Duration::from_secs(config.cycle_timeout_secs),
            interval: Duration::from_secs(config.interval_secs),
            expected_sha256: config.expected_sha256.to_ascii_lowercase(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Bind out-of-band cycles started by [`trigger`](Self::trigger) to
    /// `shutdown`.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn nodes(&self) -> &[RelayNode] {
        &self.nodes
    }

    pub fn table(&self) -> &Arc<LatencyTable> {
        &self.table
    }

    pub fn latency_of(&self, prefix: &str) -> u64 {
        self.table.latency_of(prefix)
    }

    /// Probe every relay once. Returns immediately if a cycle is running.
    pub async fn check_all(&self, force: bool) -> CycleOutcome {
        if !force && !self.features.load().accelerated_relay {
            tracing::debug!("Relay acceleration disabled, skipping probe cycle");
            return CycleOutcome::Disabled;
        }

        let _permit = match self.gate.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("Probe cycle already running");
                return CycleOutcome::AlreadyRunning;
            }
        };

        let started = Instant::now();
        let deadline = started + self.cycle_timeout;
        let cycle = CancellationToken::new();
        let _abort = cycle.clone().drop_guard();

        let probes = self.nodes.iter().map(|node| {
            let cycle = &cycle;
            async move {
                let latency = time::timeout_at(deadline, self.probe_node(node, cycle))
                    .await
                    .unwrap_or_else(|_| {
                        tracing::debug!(relay = %node.prefix, "Probe cut off by cycle deadline");
                        None
                    });
                self.table.record(&node.prefix, latency.unwrap_or(UNREACHABLE));
                metrics::record_relay_latency(&node.prefix, latency);
                latency.is_some()
            }
        });
        let verified = join_all(probes).await.into_iter().filter(|ok| *ok).count();
        let total = self.nodes.len();

        metrics::record_probe_cycle();
        tracing::info!(
            verified,
            total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Relay probe cycle complete"
        );
        CycleOutcome::Completed { verified, total }
    }

    /// Fastest verified attempt in milliseconds, `None` if none verified.
    async fn probe_node(&self, node: &RelayNode, cycle: &CancellationToken) -> Option<u64> {
        let mut best: Option<u64> = None;
        for attempt in 1..=self.attempts {
            let started = Instant::now();
            match self.fetch_verified(node, cycle).await {
                Ok(()) => {
                    let ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(UNREACHABLE - 1);
                    tracing::trace!(relay = %node.prefix, attempt, latency_ms = ms, "Probe verified");
                    best = Some(best.map_or(ms, |b| b.min(ms)));
                }
                Err(ProbeError::IntegrityMismatch { actual }) => {
                    tracing::debug!(relay = %node.prefix, attempt, digest = %actual, "Probe payload mismatch, attempt discarded");
                }
                Err(e) => {
                    tracing::debug!(relay = %node.prefix, attempt, error = %e, "Probe attempt failed");
                }
            }
        }
        best
    }

    async fn fetch_verified(
        &self,
        node: &RelayNode,
        cycle: &CancellationToken,
    ) -> Result<(), ProbeError> {
        let request = Request::get(node.probe_url.as_str())
            .header(USER_AGENT, self.user_agent.as_str())
            .body(Body::empty())
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let fetch = async {
            let response = self.transport.send(request, cycle.child_token()).await?;
            if !response.status().is_success() {
                return Err(ProbeError::Status(response.status()));
            }
            let body = axum::body::to_bytes(response.into_body(), PROBE_BODY_LIMIT)
                .await
                .map_err(|e| ProbeError::Body(e.to_string()))?;
            if body.is_empty() {
                return Err(ProbeError::Empty);
            }
            let actual = hex::encode(Sha256::digest(&body));
            if actual != self.expected_sha256 {
                return Err(ProbeError::IntegrityMismatch { actual });
            }
            Ok(())
        };

        time::timeout(self.request_timeout, fetch)
            .await
            .map_err(|_| ProbeError::Timeout(self.request_timeout))?
    }

    /// Forced cycle now, then a cycle every interval until `shutdown`.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            relays = self.nodes.len(),
            interval_secs = self.interval.as_secs(),
            "Relay probe starting"
        );

        tokio::select! {
            _ = self.check_all(true) => {}
            _ = shutdown.cancelled() => {
                tracing::info!("Relay probe received shutdown signal, exiting");
                return;
            }
        }

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }
            tokio::select! {
                _ = self.check_all(false) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        tracing::info!("Relay probe received shutdown signal, exiting");
    }

    /// Start a forced cycle in the background, abandoned on shutdown.
    pub fn trigger(self: &Arc<Self>) {
        let probe = Arc::clone(self);
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = probe.check_all(true) => {}
                _ = shutdown.cancelled() => {
                    tracing::debug!("Out-of-band probe cycle abandoned on shutdown");
                }
            }
        });
    }
}
