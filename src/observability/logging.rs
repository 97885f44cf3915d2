//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Let `RUST_LOG` override the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - The configured level applies to this crate and tower_http; everything
//!   else stays at warn unless `RUST_LOG` says otherwise

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for a configured level.
pub fn default_directive(level: &str) -> String {
    format!("warn,relay_accel={level},tower_http={level}")
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_scopes_level_to_crate() {
        assert_eq!(
            default_directive("debug"),
            "warn,relay_accel=debug,tower_http=debug"
        );
        assert!(EnvFilter::try_new(default_directive("info")).is_ok());
    }

    #[test]
    fn init_is_idempotent() {
        init_logging("info");
        init_logging("debug");
    }
}
