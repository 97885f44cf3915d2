//! Request-level racing across relay candidates.
//!
//! # Data Flow
//! ```text
//! execute(template, candidates)
//!     0 candidates → original request, sent as-is
//!     1 candidate  → sent directly, no fan-out
//!     N candidates → one clone per relay, each under its own child of
//!                    the race token
//!                  → first success status wins, every other clone's
//!                    token is cancelled and its future dropped
//!                  → all failed → AllCandidatesFailed
//! ```
//!
//! # Design Decisions
//! - Candidate failures are only collected; they never touch the latency
//!   table. Relay health is written by the probe alone.

use std::sync::Arc;

use axum::body::Body;
use futures_util::stream::{FuturesUnordered, StreamExt};
use http::{Response, Uri};
use tokio_util::sync::CancellationToken;

use crate::error::{AccelError, CandidateFailure};
use crate::http::request::RequestTemplate;
use crate::http::transport::Transport;
use crate::observability::metrics;

/// Stateless; the send function is supplied per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestRacer;

impl RequestRacer {
    /// Send `template` through one of `candidates`, first success wins.
    pub async fn execute(
        &self,
        template: &RequestTemplate,
        candidates: Vec<Uri>,
        transport: &Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Result<Response<Body>, AccelError> {
        match candidates.len() {
            0 => {
                tracing::debug!(url = %template.uri, "No relay candidates, sending original request");
                return send_single(transport, template.build_original(), cancel).await;
            }
            1 => {
                let uri = candidates.into_iter().next().unwrap_or_else(|| template.uri.clone());
                return send_single(transport, template.build(uri), cancel).await;
            }
            _ => {}
        }

        let race = cancel.child_token();
        let tokens: Vec<CancellationToken> = candidates.iter().map(|_| race.child_token()).collect();
        let mut attempts: FuturesUnordered<_> = candidates
            .into_iter()
            .zip(tokens.iter().cloned())
            .enumerate()
            .map(|(index, (uri, token))| {
                let send = transport.send(template.build(uri.clone()), token);
                async move { (index, uri, send.await) }
            })
            .collect();

        let mut failures = Vec::new();
        while let Some((index, uri, outcome)) = attempts.next().await {
            match outcome {
                Ok(response) if response.status().is_success() => {
                    for (i, token) in tokens.iter().enumerate() {
                        if i != index {
                            token.cancel();
                        }
                    }
                    tracing::debug!(winner = %uri, failed = failures.len(), "Relay race won");
                    metrics::record_race("won");
                    return Ok(response);
                }
                Ok(response) => {
                    tracing::trace!(candidate = %uri, status = %response.status(), "Race candidate returned non-success");
                    failures.push(CandidateFailure::new(&uri, format!("status {}", response.status())));
                }
                Err(e) => {
                    tracing::trace!(candidate = %uri, error = %e, "Race candidate failed");
                    failures.push(CandidateFailure::new(&uri, e.to_string()));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(AccelError::Cancelled);
        }
        tracing::warn!(candidates = failures.len(), "Every relay race candidate failed");
        metrics::record_race("exhausted");
        Err(AccelError::AllCandidatesFailed(failures))
    }
}

async fn send_single(
    transport: &Arc<dyn Transport>,
    request: http::Request<Body>,
    cancel: &CancellationToken,
) -> Result<Response<Body>, AccelError> {
    match transport.send(request, cancel.child_token()).await {
        Ok(response) => Ok(response),
        Err(_) if cancel.is_cancelled() => Err(AccelError::Cancelled),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use http::{Request, StatusCode};
    use std::sync::Mutex;
    use std::time::Duration;

    type Seen = Arc<Mutex<Vec<(String, CancellationToken)>>>;

    /// Responds per relay host: `ok` after the given delay, `bad` with 502,
    /// `err` with a transport error, anything else never answers.
    fn scripted(seen: Seen) -> Arc<dyn Transport> {
        Arc::new(move |req: Request<Body>, cancel: CancellationToken| {
            let host = req.uri().host().unwrap_or_default().to_string();
            seen.lock().unwrap().push((host.clone(), cancel.clone()));
            async move {
                let reply = |status: StatusCode| -> Result<Response<Body>, TransportError> {
                    Ok(Response::builder().status(status).body(Body::empty()).unwrap())
                };
                match host.as_str() {
                    "ok.test" => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        reply(StatusCode::OK)
                    }
                    "bad.test" => reply(StatusCode::BAD_GATEWAY),
                    "err.test" => Err(TransportError::http(std::io::Error::other("connection reset"))),
                    _ => {
                        cancel.cancelled().await;
                        Err(TransportError::Cancelled)
                    }
                }
            }
        })
    }

    async fn template() -> RequestTemplate {
        let req = Request::get("https://raw.githubusercontent.com/o/r/main/repo.json")
            .body(Body::empty())
            .unwrap();
        RequestTemplate::buffer(req, 0).await.unwrap()
    }

    fn via(host: &str) -> Uri {
        format!("https://{}/https://raw.githubusercontent.com/o/r/main/repo.json", host)
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn first_success_wins_and_losers_are_cancelled() {
        let seen: Seen = Default::default();
        let transport = scripted(seen.clone());
        let candidates = vec![via("slow.test"), via("bad.test"), via("ok.test"), via("err.test")];

        let response = RequestRacer
            .execute(&template().await, candidates, &transport, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        for (host, token) in seen.iter() {
            assert_eq!(token.is_cancelled(), host != "ok.test", "{}", host);
        }
    }

    #[tokio::test]
    async fn all_failures_are_collected() {
        let transport = scripted(Default::default());
        let err = RequestRacer
            .execute(
                &template().await,
                vec![via("bad.test"), via("err.test")],
                &transport,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            AccelError::AllCandidatesFailed(failures) => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().any(|f| f.reason.contains("502")));
                assert!(failures.iter().any(|f| f.reason.contains("connection reset")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn zero_candidates_send_the_original() {
        let seen: Seen = Default::default();
        let transport: Arc<dyn Transport> = {
            let seen = seen.clone();
            Arc::new(move |req: Request<Body>, cancel: CancellationToken| {
                seen.lock().unwrap().push((req.uri().to_string(), cancel));
                async { Ok(Response::new(Body::empty())) }
            })
        };
        RequestRacer
            .execute(&template().await, Vec::new(), &transport, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            seen.lock().unwrap()[0].0,
            "https://raw.githubusercontent.com/o/r/main/repo.json"
        );
    }

    #[tokio::test]
    async fn single_candidate_returns_its_status_unraced() {
        let transport = scripted(Default::default());
        let response = RequestRacer
            .execute(&template().await, vec![via("bad.test")], &transport, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn caller_cancellation_is_reported_as_cancelled() {
        let transport = scripted(Default::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = RequestRacer
            .execute(&template().await, vec![via("hang1.test"), via("hang2.test")], &transport, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
