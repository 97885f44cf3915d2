//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AccelConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On reload:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → feature flags swapped atomically (ArcSwap)
//!     → response cache cleared
//! ```
//!
//! # Design Decisions
//! - Only the feature flags are hot; everything else is read at startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

use std::sync::Arc;

use arc_swap::ArcSwap;

pub use schema::{
    default_relays, AccelConfig, CacheConfig, ConnectConfig, DnsConfig, FeatureFlags, HandlerConfig,
    LocalizationConfig, ObservabilityConfig, ProbeConfig, RelayConfig, SelectionConfig,
};

/// Feature flags shared between the handler, the probe and the rewriter.
pub type SharedFeatures = Arc<ArcSwap<FeatureFlags>>;

/// Wrap flags for sharing.
pub fn shared_features(flags: FeatureFlags) -> SharedFeatures {
    Arc::new(ArcSwap::from_pointee(flags))
}
