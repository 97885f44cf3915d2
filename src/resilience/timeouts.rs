//! Budgeted attempts with tightening timeouts.
//!
//! # Responsibilities
//! - Run up to N attempts inside one wall-clock budget
//! - Give each attempt min(remaining budget, per-attempt cap)
//! - Cancel the attempt's token when it times out or fails; a returned
//!   response keeps its token live so its body can still stream
//!
//! # Design Decisions
//! - A non-success status is retried; if no attempt succeeds the last
//!   response is returned rather than an error
//! - Caller cancellation ends the loop at once and is never retried

use std::future::Future;
use std::time::Duration;

use axum::body::Body;
use http::Response;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::HandlerConfig;
use crate::error::AccelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    overall: Duration,
    per_attempt: Duration,
    attempts: u32,
}

impl AttemptBudget {
    pub fn new(overall: Duration, per_attempt: Duration, attempts: u32) -> Self {
        Self {
            overall,
            per_attempt,
            attempts: attempts.max(1),
        }
    }

    pub fn from_config(config: &HandlerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.tracked_budget_secs),
            Duration::from_secs(config.tracked_attempt_secs),
            config.tracked_attempts,
        )
    }

    /// Timeout for an attempt starting `elapsed` into the budget, `None`
    /// once the budget is spent.
    pub fn next_timeout(&self, elapsed: Duration) -> Option<Duration> {
        let remaining = self.overall.checked_sub(elapsed)?;
        if remaining.is_zero() {
            return None;
        }
        Some(remaining.min(self.per_attempt))
    }

    /// Run `attempt` until it yields a success status or the budget runs out.
    pub async fn run<F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<Response<Body>, AccelError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<Response<Body>, AccelError>>,
    {
        let started = Instant::now();
        let mut last_response: Option<Response<Body>> = None;
        let mut last_error: Option<AccelError> = None;

        for n in 1..=self.attempts {
            let Some(timeout) = self.next_timeout(started.elapsed()) else {
                break;
            };
            let token = cancel.child_token();
            let outcome = time::timeout(timeout, attempt(token.clone())).await;
            if !matches!(outcome, Ok(Ok(_))) {
                token.cancel();
            }

            if cancel.is_cancelled() {
                return Err(AccelError::Cancelled);
            }

            match outcome {
                Ok(Ok(response)) if response.status().is_success() => return Ok(response),
                Ok(Ok(response)) => {
                    tracing::debug!(attempt = n, status = %response.status(), "Budgeted attempt got non-success status");
                    last_error = None;
                    last_response = Some(response);
                }
                Ok(Err(e)) => {
                    tracing::debug!(attempt = n, error = %e, "Budgeted attempt failed");
                    last_response = None;
                    last_error = Some(e);
                }
                Err(_) => {
                    tracing::debug!(attempt = n, timeout_ms = timeout.as_millis() as u64, "Budgeted attempt timed out");
                    last_response = None;
                    last_error = Some(AccelError::Timeout(timeout));
                }
            }
        }

        match (last_response, last_error) {
            (Some(response), _) => Ok(response),
            (None, Some(e)) => Err(e),
            (None, None) => Err(AccelError::Timeout(self.overall)),
        }
    }
}
