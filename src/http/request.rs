//! Buffered, cloneable outgoing requests.
//!
//! # Responsibilities
//! - Buffer the request body once so the request can be replayed per
//!   relay candidate or retry attempt
//! - Attach the User-Agent when the caller set none
//!
//! # Design Decisions
//! - Headers and body are copied per rebuilt request; the original is
//!   kept for logging and cache keys

use axum::body::Body;
use bytes::Bytes;
use http::header::{HeaderValue, USER_AGENT};
use http::{HeaderMap, Method, Request, Uri, Version};

use crate::error::AccelError;

/// A request whose parts can be turned into fresh `Request<Body>` values.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestTemplate {
    /// Buffer `request` up to `limit` body bytes.
    pub async fn buffer(request: Request<Body>, limit: usize) -> Result<Self, AccelError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| AccelError::BodyRead(e.to_string()))?;
        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        })
    }

    pub fn url(&self) -> String {
        self.uri.to_string()
    }

    /// Set User-Agent unless one is already present.
    pub fn ensure_user_agent(&mut self, user_agent: &str) {
        if self.headers.contains_key(USER_AGENT) {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            self.headers.insert(USER_AGENT, value);
        }
    }

    /// Fresh request targeting `uri`.
    pub fn build(&self, uri: Uri) -> Request<Body> {
        let mut request = Request::new(Body::from(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        request
    }

    /// Fresh request targeting the original URI.
    pub fn build_original(&self) -> Request<Body> {
        self.build(self.uri.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rebuilds_carry_headers_and_body() {
        let request = Request::post("https://upstream.test/a")
            .header("x-trace", "1")
            .body(Body::from("payload"))
            .unwrap();
        let template = RequestTemplate::buffer(request, 1024).await.unwrap();

        let rebuilt = template.build("https://relay.test/https://upstream.test/a".parse().unwrap());
        assert_eq!(rebuilt.method(), Method::POST);
        assert_eq!(rebuilt.headers()["x-trace"], "1");
        assert_eq!(
            rebuilt.uri().to_string(),
            "https://relay.test/https://upstream.test/a"
        );
        let body = axum::body::to_bytes(rebuilt.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"payload");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let request = Request::post("https://upstream.test/a")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();
        let err = RequestTemplate::buffer(request, 16).await.unwrap_err();
        assert!(matches!(err, AccelError::BodyRead(_)));
    }

    #[tokio::test]
    async fn user_agent_is_only_added_when_missing() {
        let request = Request::get("https://upstream.test/").body(Body::empty()).unwrap();
        let mut template = RequestTemplate::buffer(request, 0).await.unwrap();
        template.ensure_user_agent("relay-accel/test");
        assert_eq!(template.headers[USER_AGENT], "relay-accel/test");

        template.ensure_user_agent("other");
        assert_eq!(template.headers[USER_AGENT], "relay-accel/test");
    }
}
