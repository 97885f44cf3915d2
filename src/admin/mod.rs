//! Read-only status surface for the host's settings window.
//!
//! `GET /status` reports the accelerated-request counter, cache size and
//! feature flags; `GET /relays` the latency table, fastest first.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::cache::ResponseCache;
use crate::config::SharedFeatures;
use crate::health::LatencyTable;
use crate::observability::AccelStats;
use crate::routing::RepositoryRegistry;

use self::handlers::{get_relays, get_status};

#[derive(Clone)]
pub struct StatusState {
    pub stats: Arc<AccelStats>,
    pub cache: Arc<ResponseCache>,
    pub table: Arc<LatencyTable>,
    pub registry: Arc<RepositoryRegistry>,
    pub features: SharedFeatures,
}

pub fn status_router(state: StatusState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/relays", get(get_relays))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the status router on `addr` until `shutdown` is cancelled.
pub async fn serve_status(
    addr: SocketAddr,
    state: StatusState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Status endpoint listening");
    axum::serve(listener, status_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
