//! Connection-level racing across resolved addresses (Happy Eyeballs).
//!
//! # Data Flow
//! ```text
//! connect(host, port)
//!     → DnsPreference::resolve (ordered addresses)
//!     → AddressPenaltyBox::prioritize (recent failures last)
//!     → attempt i starts at i × backoff_step,
//!       or immediately once an earlier attempt has failed
//!     → first socket wins, the race token is cancelled,
//!       every other attempt is dropped with its socket
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::ConnectConfig;
use crate::net::dns::DnsPreference;
use crate::net::penalty::AddressPenaltyBox;

/// Every variant is a failed connection from the request path's view.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no addresses resolved for {0}")]
    NoAddresses(String),

    #[error("all connection attempts to {host} failed: {}", summarize(.failures))]
    Exhausted {
        host: String,
        failures: Vec<(SocketAddr, io::Error)>,
    },

    #[error("connect cancelled")]
    Cancelled,

    #[error("uri has no host")]
    MissingHost,

    #[error("tls handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },
}

fn summarize(failures: &[(SocketAddr, io::Error)]) -> String {
    failures
        .iter()
        .map(|(addr, e)| format!("{} ({})", addr, e))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Races staggered TCP connects over the addresses of one host.
pub struct AddressRacer {
    dns: Arc<DnsPreference>,
    penalties: Arc<AddressPenaltyBox>,
    backoff_step: Duration,
    attempt_timeout: Duration,
}

impl AddressRacer {
    pub fn new(
        dns: Arc<DnsPreference>,
        penalties: Arc<AddressPenaltyBox>,
        config: &ConnectConfig,
    ) -> Self {
        Self {
            dns,
            penalties,
            backoff_step: Duration::from_millis(config.backoff_step_ms),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
        }
    }

    pub fn penalties(&self) -> &Arc<AddressPenaltyBox> {
        &self.penalties
    }

    /// Resolve `host` and return the first live stream to `port`.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<TcpStream, ConnectError> {
        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
            result = self.dns.resolve(host) => result,
        };
        let addrs = resolved.map_err(|source| ConnectError::Resolve {
            host: host.to_string(),
            source,
        })?;

        let addrs = self.penalties.prioritize(addrs);
        let targets: Vec<SocketAddr> = addrs
            .into_iter()
            .map(|ip| SocketAddr::new(ip, port))
            .collect();

        self.race(host, &targets, cancel).await
    }

    async fn race(
        &self,
        host: &str,
        targets: &[SocketAddr],
        cancel: &CancellationToken,
    ) -> Result<TcpStream, ConnectError> {
        if targets.is_empty() {
            return Err(ConnectError::NoAddresses(host.to_string()));
        }

        let race = cancel.child_token();
        let mut attempts = FuturesUnordered::new();
        let mut failures = Vec::new();
        let mut next = 0;
        let mut next_start = Instant::now();

        let result = loop {
            if next < targets.len() && Instant::now() >= next_start {
                let addr = targets[next];
                attempts.push(attempt(addr, self.attempt_timeout, race.child_token()));
                next += 1;
                next_start = Instant::now() + self.backoff_step;
                tracing::trace!(host = %host, addr = %addr, attempt = next, "Connection attempt started");
            }

            if attempts.is_empty() && next >= targets.len() {
                break Err(ConnectError::Exhausted {
                    host: host.to_string(),
                    failures,
                });
            }

            tokio::select! {
                biased;
                _ = race.cancelled() => break Err(ConnectError::Cancelled),
                Some((addr, outcome)) = attempts.next(), if !attempts.is_empty() => match outcome {
                    Ok(stream) => {
                        self.penalties.clear(&addr.ip());
                        tracing::debug!(host = %host, addr = %addr, "Connection race won");
                        break Ok(stream);
                    }
                    Err(e) => {
                        tracing::debug!(host = %host, addr = %addr, error = %e, "Connection attempt failed");
                        self.penalties.penalize(addr.ip());
                        failures.push((addr, e));
                        // Skip the rest of the stagger for the next address.
                        next_start = Instant::now();
                    }
                },
                _ = time::sleep_until(next_start), if next < targets.len() => {}
            }
        };

        race.cancel();
        result
    }
}

async fn attempt(
    addr: SocketAddr,
    timeout: Duration,
    token: CancellationToken,
) -> (SocketAddr, io::Result<TcpStream>) {
    let outcome = tokio::select! {
        _ = token.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "attempt cancelled")),
        result = time::timeout(timeout, TcpStream::connect(addr)) => match result {
            Ok(Ok(stream)) => stream.set_nodelay(true).map(|_| stream),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
        },
    };
    (addr, outcome)
}
