//! HTTP acceleration and resilience layer for a geo-blocked upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!   host request + send function
//!          │
//!          ▼
//!   ┌──────────────┐   hit   ┌──────────────┐
//!   │ http handler │────────▶│    cache     │
//!   └──────┬───────┘         └──────────────┘
//!          │ miss
//!          ▼
//!   ┌──────────────┐  reads  ┌──────────────┐  writes  ┌──────────────┐
//!   │load_balancer │◀────────│ latency table│◀─────────│ health probe │
//!   │selector/rewrite        └──────────────┘          └──────────────┘
//!   └──────┬───────┘
//!          ▼
//!   ┌──────────────┐         ┌──────────────┐
//!   │  resilience  │────────▶│  transport   │── net: DNS preference,
//!   │ budget/race  │         │ (hyper-util) │   penalty box, address race
//!   └──────────────┘         └──────────────┘
//! ```
//!
//! Cross-cutting: `config` (TOML, validation, hot flags), `observability`
//! (tracing, metrics), `lifecycle` (composition root, shutdown), `admin`
//! (read-only status endpoint).

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod localization;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::AccelConfig;
pub use error::{AccelError, TransportError};
pub use http::{AccelerationHandler, Transport};
pub use lifecycle::{Accelerator, Shutdown};
