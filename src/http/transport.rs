//! The next-hop send function.
//!
//! Everything above this seam (probe, racer, handler) talks to a
//! `Transport`; production wires in `HyperTransport`, tests pass closures.

use std::future::Future;
use std::time::Duration;

use axum::body::Body;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::net::RacingConnector;

pub type TransportFuture = BoxFuture<'static, Result<Response<Body>, TransportError>>;

/// Sends one request. Cancelling `cancel` must abandon the send.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: Request<Body>, cancel: CancellationToken) -> TransportFuture;
}

impl<F, Fut> Transport for F
where
    F: Fn(Request<Body>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>, TransportError>> + Send + 'static,
{
    fn send(&self, request: Request<Body>, cancel: CancellationToken) -> TransportFuture {
        Box::pin((self)(request, cancel))
    }
}

/// hyper-util pooled client over the racing connector.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<RacingConnector, Body>,
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(connector: RacingConnector, timeout: Duration, pool_idle: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(pool_idle)
            .build(connector);
        Self { client, timeout }
    }
}

impl Transport for HyperTransport {
    fn send(&self, request: Request<Body>, cancel: CancellationToken) -> TransportFuture {
        let client = self.client.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                result = time::timeout(timeout, client.request(request)) => match result {
                    Ok(Ok(response)) => Ok(response.map(Body::new)),
                    Ok(Err(e)) => Err(TransportError::http(e)),
                    Err(_) => Err(TransportError::Timeout(timeout)),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn closures_are_transports() {
        let transport: Arc<dyn Transport> = Arc::new(|req: Request<Body>, _cancel: CancellationToken| async move {
            let status = if req.uri().path() == "/ok" {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            Ok(Response::builder().status(status).body(Body::empty()).unwrap())
        });

        let ok = Request::get("http://x.test/ok").body(Body::empty()).unwrap();
        let resp = transport.send(ok, CancellationToken::new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let missing = Request::get("http://x.test/nope").body(Body::empty()).unwrap();
        let resp = transport.send(missing, CancellationToken::new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
