//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, request-id spans)
//!     → metrics.rs (counters and gauges through the metrics facade)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//!     → admin status endpoint (AccelStats, latency table)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the handler span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use metrics::AccelStats;
