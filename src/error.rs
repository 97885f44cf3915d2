//! Error types shared across the request path.

use std::fmt;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single transport send.
#[derive(Debug, Error)]
pub enum TransportError {
    /// DNS, connect or HTTP-level failure below the response.
    #[error("transport failure: {0}")]
    Http(#[source] BoxError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn http<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Http(err.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Why one race candidate did not win.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub uri: String,
    pub reason: String,
}

impl CandidateFailure {
    pub fn new(uri: &http::Uri, reason: impl Into<String>) -> Self {
        Self {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.uri, self.reason)
    }
}

/// Request-level failure surfaced by the acceleration handler.
#[derive(Debug, Error)]
pub enum AccelError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("all {} race candidates failed: {}", .0.len(), join(.0))]
    AllCandidatesFailed(Vec<CandidateFailure>),

    /// Produced by [`ensure_success`](crate::http::response::ensure_success)
    /// for callers that treat a non-success answer as a failure. The handler
    /// itself returns such responses unchanged.
    #[error("upstream answered {0}")]
    NonSuccessStatus(StatusCode),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("request cancelled")]
    Cancelled,

    #[error("failed to read body: {0}")]
    BodyRead(String),
}

impl AccelError {
    /// True when the caller's own token ended the request.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Transport(TransportError::Cancelled)
        )
    }
}

fn join(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
