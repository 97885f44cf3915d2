//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate relay URLs, CIDR blocks and the probe digest
//! - Validate value ranges (timeouts > 0, budgets consistent)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AccelConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use url::Url;

use crate::config::schema::AccelConfig;
use crate::net::dns::CidrRange;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check every semantic rule and collect all violations.
pub fn validate_config(config: &AccelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.relays.is_empty() {
        errors.push(ValidationError::new("relays", "at least one relay is required"));
    }
    for (i, relay) in config.relays.iter().enumerate() {
        match Url::parse(&relay.probe_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
            Ok(_) => errors.push(ValidationError::new(
                format!("relays[{}].probe_url", i),
                "must be an absolute http(s) URL",
            )),
            Err(e) => errors.push(ValidationError::new(
                format!("relays[{}].probe_url", i),
                e.to_string(),
            )),
        }
    }

    let digest = &config.probe.expected_sha256;
    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        errors.push(ValidationError::new(
            "probe.expected_sha256",
            "must be 64 hex characters",
        ));
    }

    for (field, value) in [
        ("probe.interval_secs", config.probe.interval_secs),
        ("probe.cycle_timeout_secs", config.probe.cycle_timeout_secs),
        ("probe.request_timeout_secs", config.probe.request_timeout_secs),
        ("connect.backoff_step_ms", config.connect.backoff_step_ms),
        ("connect.attempt_timeout_ms", config.connect.attempt_timeout_ms),
        ("cache.read_timeout_secs", config.cache.read_timeout_secs),
        ("handler.tracked_budget_secs", config.handler.tracked_budget_secs),
        ("handler.tracked_attempt_secs", config.handler.tracked_attempt_secs),
        ("handler.request_timeout_secs", config.handler.request_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if config.probe.attempts == 0 {
        errors.push(ValidationError::new("probe.attempts", "must be at least 1"));
    }
    if config.handler.tracked_attempts == 0 {
        errors.push(ValidationError::new("handler.tracked_attempts", "must be at least 1"));
    }
    if config.handler.tracked_attempt_secs > config.handler.tracked_budget_secs {
        errors.push(ValidationError::new(
            "handler.tracked_attempt_secs",
            "must not exceed handler.tracked_budget_secs",
        ));
    }
    if config.cache.max_usage_count == 0 {
        errors.push(ValidationError::new("cache.max_usage_count", "must be at least 1"));
    }
    if config.selection.race_candidates == 0 {
        errors.push(ValidationError::new("selection.race_candidates", "must be at least 1"));
    }

    for (i, range) in config.dns.edge_ranges.iter().enumerate() {
        if let Err(e) = range.parse::<CidrRange>() {
            errors.push(ValidationError::new(format!("dns.edge_ranges[{}]", i), e));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&AccelConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = AccelConfig::default();
        config.relays[0].probe_url = "ftp://example.com/x".into();
        config.dns.edge_ranges.push("10.0.0.0/40".into());
        config.cache.max_usage_count = 0;
        config.handler.tracked_attempt_secs = 30;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"relays[0].probe_url"));
        assert!(fields.contains(&"dns.edge_ranges[15]"));
        assert!(fields.contains(&"cache.max_usage_count"));
        assert!(fields.contains(&"handler.tracked_attempt_secs"));
    }

    #[test]
    fn empty_relay_list_rejected() {
        let mut config = AccelConfig::default();
        config.relays.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "relays");
    }
}
