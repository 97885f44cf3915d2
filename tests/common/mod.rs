//! Shared utilities for integration tests: programmable HTTP/1.1 relays
//! on loopback.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relay_accel::config::{AccelConfig, RelayConfig};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Body served for probe paths.
pub const PROBE_PAYLOAD: &[u8] = b"relay-accel integration probe payload";
pub const PROBE_PATH: &str = "https://raw.githubusercontent.com/owner/plugins/main/random.bin";

/// What a mock relay answers for one request path.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A loopback relay recording every request path it served.
pub struct MockRelay {
    pub addr: SocketAddr,
    paths: Arc<Mutex<Vec<String>>>,
}

impl MockRelay {
    /// Start a relay answering each request path with `script(path)`.
    pub async fn start<F>(script: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let paths = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);

        let seen = paths.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let script = script.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let Some(path) = read_request_path(&mut socket).await else {
                        return;
                    };
                    seen.lock().unwrap().push(path.clone());
                    let reply = script(&path);
                    tokio::time::sleep(reply.delay).await;

                    let head = format!(
                        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        reply.status,
                        reason(reply.status),
                        reply.body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&reply.body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, paths }
    }

    /// A relay that passes probes and answers everything else with `body`.
    pub async fn healthy(body: &'static str) -> Self {
        Self::start(move |path| {
            if path.ends_with("random.bin") {
                Reply::ok(PROBE_PAYLOAD)
            } else {
                Reply::ok(body)
            }
        })
        .await
    }

    pub fn prefix(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            probe_url: format!("{}{}", self.prefix(), PROBE_PATH),
            tags: Vec::new(),
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    /// Requests other than probes.
    pub fn traffic(&self) -> Vec<String> {
        self.paths()
            .into_iter()
            .filter(|p| !p.ends_with("random.bin"))
            .collect()
    }
}

async fn read_request_path(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next()?;
    request_line.split_whitespace().nth(1).map(str::to_string)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Defaults pointed at `relays`, with the probe digest of `PROBE_PAYLOAD`.
pub fn config_for(relays: &[&MockRelay]) -> AccelConfig {
    let mut config = AccelConfig::default();
    config.relays = relays.iter().map(|r| r.relay_config()).collect();
    config.probe.expected_sha256 = hex::encode(Sha256::digest(PROBE_PAYLOAD));
    config.cache.hit_delay_ms = 0;
    config
}

/// A loopback port with nothing listening.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
