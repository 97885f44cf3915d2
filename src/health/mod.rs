//! Relay health subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     relay.rs (nodes from config) → latency.rs (every prefix = ∞)
//!
//! Probe cycle (probe.rs):
//!     startup (forced) | hourly ticker | consecutive-error trigger
//!     → fetch fixed payload through each relay concurrently
//!     → SHA-256 must match, else the attempt is discarded
//!     → fastest verified attempt written to latency.rs, or ∞
//!
//! Readers:
//!     load_balancer::selector (relay choice), admin (status)
//! ```
//!
//! # Design Decisions
//! - Only the probe writes latencies; request failures never do
//! - Overlapping cycles are coalesced, not queued
//! - One latency table per process, owned by the composition root

pub mod latency;
pub mod probe;
pub mod relay;

pub use latency::{LatencyTable, UNREACHABLE};
pub use probe::{CycleOutcome, RelayHealthProbe};
pub use relay::RelayNode;
