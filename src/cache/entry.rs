//! A buffered response with a bounded number of reads.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, Version};
use tokio::time::Instant;

#[derive(Debug)]
pub struct CachedEntry {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remaining_uses: AtomicU32,
    expires_at: Instant,
}

impl CachedEntry {
    pub fn new(parts: &Parts, body: Bytes, max_uses: u32, ttl: Duration) -> Self {
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers.clone(),
            body,
            remaining_uses: AtomicU32::new(max_uses),
            expires_at: Instant::now() + ttl,
        }
    }

    /// Claim one read. Fails once every read has been handed out.
    pub fn try_use(&self) -> bool {
        self.remaining_uses
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining_uses(&self) -> u32 {
        self.remaining_uses.load(Ordering::Acquire)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_uses() == 0
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// A fresh response carrying the cached status, headers and body.
    pub fn to_response(&self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers.clone();
        response
    }
}
