//! The response cache.
//!
//! # Responsibilities
//! - Decide which requests may be served from cache
//! - Serve each entry a bounded number of times within its TTL
//! - Buffer upstream bodies under a timeout and size limit
//!
//! # Design Decisions
//! - Keyed by the request URL as the caller sent it
//! - Buffering never fails a response: a body that is too large, too slow
//!   or broken mid-stream is handed back uncached, with the chunks already
//!   read replayed ahead of the rest of the stream
//! - Exhausted and expired entries are removed on lookup, and only if the
//!   map still holds that same entry

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, BodyDataStream, HttpBody};
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use http::header::CONTENT_LENGTH;
use http::response::Parts;
use http::{Method, Response};
use tokio::time::{self, Instant};

use crate::cache::entry::CachedEntry;
use crate::config::CacheConfig;
use crate::observability::metrics;
use crate::routing::matcher::{Matcher, SuffixMatcher};

/// Result of reading a response body for caching.
pub enum Buffered {
    Complete(Parts, Bytes),
    /// The body could not be held in memory; the response is intact but
    /// must not be cached.
    Passthrough(Response<Body>),
}

pub struct ResponseCache {
    entries: DashMap<String, Arc<CachedEntry>>,
    archive: SuffixMatcher,
    max_usage_count: u32,
    read_timeout: Duration,
    max_body_bytes: usize,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig, archive_suffix: &str) -> Self {
        Self {
            entries: DashMap::new(),
            archive: SuffixMatcher::new(archive_suffix),
            max_usage_count: config.max_usage_count.max(1),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// GETs of anything but archives.
    pub fn is_eligible(&self, method: &Method, url: &str) -> bool {
        method == Method::GET && !self.archive.matches(url)
    }

    /// Cached response for `key`, consuming one of the entry's reads.
    pub fn try_get(&self, key: &str) -> Option<Response<Body>> {
        let entry = match self.entries.get(key) {
            Some(found) => Arc::clone(found.value()),
            None => {
                metrics::record_cache_lookup(false);
                return None;
            }
        };

        let served = !entry.is_expired() && entry.try_use();
        if !served || entry.is_exhausted() {
            self.entries.remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
        }

        metrics::record_cache_lookup(served);
        if !served {
            tracing::trace!(key = %key, "Cache entry expired or exhausted");
            return None;
        }
        tracing::trace!(key = %key, remaining = entry.remaining_uses(), "Cache hit");
        Some(entry.to_response())
    }

    /// Read a response body under the cache's timeout and size limit.
    pub async fn buffer(&self, response: Response<Body>) -> Buffered {
        let (parts, body) = response.into_parts();
        let limit = self.max_body_bytes as u64;
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        if declared.or(HttpBody::size_hint(&body).upper()).is_some_and(|len| len > limit) {
            tracing::debug!(declared = ?declared, limit, "Body exceeds cache limit, not buffering");
            return Buffered::Passthrough(Response::from_parts(parts, body));
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut frames = body.into_data_stream();
        let mut chunks: Vec<Bytes> = Vec::new();
        let mut read = 0usize;
        loop {
            match time::timeout_at(deadline, frames.next()).await {
                Ok(Some(Ok(chunk))) => {
                    read += chunk.len();
                    chunks.push(chunk);
                    if read > self.max_body_bytes {
                        tracing::debug!(read, limit, "Body exceeded cache limit while reading");
                        return Buffered::Passthrough(resume(parts, chunks, frames, None));
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::debug!(error = %e, "Body failed while buffering");
                    return Buffered::Passthrough(resume(parts, chunks, frames, Some(e)));
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!(
                        read,
                        timeout_ms = self.read_timeout.as_millis() as u64,
                        "Body read timed out, not caching"
                    );
                    return Buffered::Passthrough(resume(parts, chunks, frames, None));
                }
            }
        }

        let body = match chunks.len() {
            0 => Bytes::new(),
            1 => chunks.swap_remove(0),
            _ => chunks.concat().into(),
        };
        Buffered::Complete(parts, body)
    }

    /// Store a buffered response under `key` for `ttl`.
    pub fn insert(&self, key: &str, parts: &Parts, body: Bytes, ttl: Duration) -> Arc<CachedEntry> {
        let entry = Arc::new(CachedEntry::new(parts, body, self.max_usage_count, ttl));
        self.entries.insert(key.to_string(), Arc::clone(&entry));
        tracing::trace!(key = %key, ttl_secs = ttl.as_secs(), "Response cached");
        entry
    }

    /// Buffer `response`, cache it and hand back an equivalent response.
    /// Bodies that cannot be buffered pass through uncached.
    pub async fn put(&self, key: &str, response: Response<Body>, ttl: Duration) -> Response<Body> {
        match self.buffer(response).await {
            Buffered::Complete(parts, body) => self.insert(key, &parts, body, ttl).to_response(),
            Buffered::Passthrough(response) => response,
        }
    }

    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        tracing::debug!(dropped, "Response cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rebuild a body from the chunks already read followed by the unread rest.
fn resume(
    parts: Parts,
    chunks: Vec<Bytes>,
    rest: BodyDataStream,
    failure: Option<axum::Error>,
) -> Response<Body> {
    let replay = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
    let body = match failure {
        Some(e) => Body::from_stream(replay.chain(stream::once(async move { Err(e) }))),
        None => Body::from_stream(replay.chain(rest)),
    };
    Response::from_parts(parts, body)
}
