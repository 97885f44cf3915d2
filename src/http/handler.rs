//! The acceleration handler: one call per outbound request.
//!
//! # Data Flow
//! ```text
//! send(request, transport, cancel)
//!     → GET to a malformed host?   → synthesized `[]`
//!     → buffer body, set User-Agent
//!     → cache-eligible GET hit?    → cached response after hit delay
//!     → tracked repository?        → AttemptBudget around dispatch
//!     → dispatch: relay candidates (race for tracked upstream URLs,
//!       single best relay otherwise) → RequestRacer → transport
//!     → success: reset error streak, count acceleration,
//!       localize, cache
//!     → failure: extend error streak (re-probe at threshold),
//!       official repository → synthesized `[]`, else propagate
//! ```
//!
//! # Design Decisions
//! - The transport is supplied per call; the handler never owns the
//!   next hop
//! - Caller cancellation is never counted as a relay failure and never
//!   turned into a synthesized response
//! - A non-success status is returned to the caller as-is; it only
//!   feeds the error streak

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{Buffered, ResponseCache};
use crate::config::{AccelConfig, FeatureFlags, SharedFeatures};
use crate::error::AccelError;
use crate::health::RelayHealthProbe;
use crate::http::request::RequestTemplate;
use crate::http::response::empty_json_list;
use crate::http::transport::Transport;
use crate::load_balancer::RelayRewriter;
use crate::localization::ResponseRewriter;
use crate::observability::{metrics, AccelStats};
use crate::resilience::{AttemptBudget, RequestRacer};
use crate::routing::matcher::{looks_resolvable, Matcher, PrefixMatcher, SuffixMatcher};
use crate::routing::RepositoryRegistry;

/// Non-success statuses for these paths are expected and not counted.
const EXEMPT_SUFFIX: &str = "png";

pub struct AccelerationHandler {
    features: SharedFeatures,
    cache: Arc<ResponseCache>,
    rewriter: Arc<RelayRewriter>,
    registry: Arc<RepositoryRegistry>,
    probe: Arc<RelayHealthProbe>,
    stats: Arc<AccelStats>,
    translator: Option<Arc<dyn ResponseRewriter>>,
    racer: RequestRacer,
    budget: AttemptBudget,
    official: PrefixMatcher,
    exempt: SuffixMatcher,
    user_agent: String,
    max_request_body_bytes: usize,
    race_candidates: usize,
    upstream_ttl: Duration,
    default_ttl: Duration,
    hit_delay: Duration,
    max_error_count: u32,
    error_streak: AtomicU32,
}

impl AccelerationHandler {
    pub fn new(
        config: &AccelConfig,
        features: SharedFeatures,
        cache: Arc<ResponseCache>,
        rewriter: Arc<RelayRewriter>,
        registry: Arc<RepositoryRegistry>,
        probe: Arc<RelayHealthProbe>,
        stats: Arc<AccelStats>,
    ) -> Self {
        Self {
            features,
            cache,
            rewriter,
            registry,
            probe,
            stats,
            translator: None,
            racer: RequestRacer,
            budget: AttemptBudget::from_config(&config.handler),
            official: PrefixMatcher::new([config.handler.official_repo_prefix.as_str()]),
            exempt: SuffixMatcher::new(EXEMPT_SUFFIX),
            user_agent: config.handler.user_agent.clone(),
            max_request_body_bytes: config.handler.max_request_body_bytes,
            race_candidates: config.selection.race_candidates.max(1),
            upstream_ttl: Duration::from_secs(config.cache.upstream_ttl_secs),
            default_ttl: Duration::from_secs(config.cache.default_ttl_secs),
            hit_delay: Duration::from_millis(config.cache.hit_delay_ms),
            max_error_count: config.probe.max_error_count.max(1),
            error_streak: AtomicU32::new(0),
        }
    }

    /// Attach the body post-processor for tracked first-party listings.
    pub fn with_translator(mut self, translator: Arc<dyn ResponseRewriter>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn error_streak(&self) -> u32 {
        self.error_streak.load(Ordering::Relaxed)
    }

    /// Fulfil `request`, sending through `transport` when nothing cached
    /// or synthesized answers it.
    pub async fn send(
        &self,
        request: Request<Body>,
        transport: &Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Result<Response<Body>, AccelError> {
        let span = tracing::info_span!(
            "accel",
            request_id = %Uuid::new_v4(),
            method = %request.method(),
            url = %request.uri(),
        );

        let result = self.handle(request, transport, cancel).instrument(span).await;
        let label = match &result {
            Ok((_, label)) => *label,
            Err(e) if e.is_cancelled() => "cancelled",
            Err(_) => "error",
        };
        metrics::record_request(label);
        result.map(|(response, _)| response)
    }

    async fn handle(
        &self,
        request: Request<Body>,
        transport: &Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Result<(Response<Body>, &'static str), AccelError> {
        let host = request.uri().host().unwrap_or_default();
        if request.method() == Method::GET && !looks_resolvable(host) {
            tracing::debug!(host = %host, "Unresolvable host, answering with an empty list");
            return Ok((empty_json_list(), "synthesized"));
        }

        let mut template = RequestTemplate::buffer(request, self.max_request_body_bytes).await?;
        template.ensure_user_agent(&self.user_agent);
        let url = template.url();
        let features = self.features.load_full();
        let cacheable = features.response_cache && self.cache.is_eligible(&template.method, &url);

        if cacheable {
            if let Some(response) = self.cache.try_get(&url) {
                if self.rewriter.applies(&url) {
                    self.stats.record_accelerated();
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AccelError::Cancelled),
                    _ = tokio::time::sleep(self.hit_delay) => {}
                }
                return Ok((response, "cache_hit"));
            }
        }

        let tracked = self.registry.contains(&url);
        let outcome = if tracked {
            let template = &template;
            self.budget
                .run(cancel, |attempt| async move {
                    self.dispatch(template, tracked, transport, &attempt).await
                })
                .await
        } else {
            self.dispatch(&template, tracked, transport, cancel).await
        };

        let e = match outcome {
            Ok(response) if response.status().is_success() => {
                let response = self.finish(&url, response, &features, cacheable).await;
                return Ok((response, "ok"));
            }
            Ok(response) => {
                if !self.exempt.matches(&url) {
                    tracing::warn!(status = %response.status(), "Upstream answered with non-success status");
                    self.record_failure();
                }
                return Ok((response, "upstream_status"));
            }
            Err(e) => e,
        };

        if e.is_cancelled() || cancel.is_cancelled() {
            return Err(AccelError::Cancelled);
        }
        self.record_failure();
        if self.official.matches(&url) {
            tracing::warn!(error = %e, "Official repository unreachable, answering with an empty list");
            return Ok((empty_json_list(), "fallback"));
        }
        tracing::warn!(error = %e, "Request failed");
        Err(e)
    }

    /// Pick relay candidates and send. Tracked upstream URLs race several
    /// relays; everything else goes through the single best one.
    async fn dispatch(
        &self,
        template: &RequestTemplate,
        tracked: bool,
        transport: &Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Result<Response<Body>, AccelError> {
        let url = template.url();
        let mut excluded = HashSet::new();
        let candidates = if tracked && self.rewriter.is_upstream(&url) {
            self.rewriter.relay_uris(&url, self.race_candidates, &mut excluded)
        } else {
            self.rewriter.relay_uri(&url, &mut excluded).into_iter().collect()
        };
        if let Some(first) = candidates.first() {
            tracing::trace!(relay = %first, candidates = candidates.len(), "Relay candidates selected");
        }
        self.racer.execute(template, candidates, transport, cancel).await
    }

    async fn finish(
        &self,
        url: &str,
        response: Response<Body>,
        features: &FeatureFlags,
        cacheable: bool,
    ) -> Response<Body> {
        self.error_streak.store(0, Ordering::Relaxed);
        if self.rewriter.applies(url) {
            self.stats.record_accelerated();
        }

        let translator = self
            .translator
            .as_ref()
            .filter(|_| features.localized_descriptions)
            .filter(|_| self.registry.get(url).is_some_and(|repo| !repo.third_party));
        if translator.is_none() && !cacheable {
            return response;
        }

        let (mut parts, mut body) = match self.cache.buffer(response).await {
            Buffered::Complete(parts, body) => (parts, body),
            Buffered::Passthrough(response) => {
                tracing::debug!(url = %url, "Body not buffered, passing through unmodified");
                return response;
            }
        };
        if let Some(rewritten) = translator.and_then(|t| t.rewrite(url, &body)) {
            body = rewritten;
            parts.headers.remove(CONTENT_LENGTH);
            parts
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        }

        if cacheable {
            let ttl = if self.rewriter.is_upstream(url) {
                self.upstream_ttl
            } else {
                self.default_ttl
            };
            return self.cache.insert(url, &parts, body, ttl).to_response();
        }
        Response::from_parts(parts, Body::from(body))
    }

    fn record_failure(&self) {
        let streak = self.error_streak.fetch_add(1, Ordering::Relaxed) + 1;
        if streak >= self.max_error_count {
            self.error_streak.store(0, Ordering::Relaxed);
            tracing::warn!(streak, "Consecutive failures reached threshold, re-probing relays");
            self.probe.trigger();
        }
    }
}
