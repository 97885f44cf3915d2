//! Composition root.
//!
//! # Responsibilities
//! - Build the process-wide tables (latency, penalties) exactly once
//! - Wire the probe, selector, cache, registry and handler together
//! - Start background tasks (probe ticker) under the shutdown token
//! - Apply feature flag changes from the host or a config reload
//!
//! # Design Decisions
//! - Fail fast: a TLS setup error is fatal
//! - Tables are owned here and passed down by `Arc`; nothing is global
//! - A missing or broken translations file only disables localization

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use http::{Request, Response};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::admin::StatusState;
use crate::cache::ResponseCache;
use crate::config::{shared_features, AccelConfig, FeatureFlags, SharedFeatures};
use crate::error::AccelError;
use crate::health::relay::nodes_from_config;
use crate::health::{LatencyTable, RelayHealthProbe};
use crate::http::{AccelerationHandler, HyperTransport, Transport};
use crate::lifecycle::shutdown::Shutdown;
use crate::load_balancer::{RelayRewriter, RelaySelector};
use crate::localization::{DescriptionTranslator, ResponseRewriter};
use crate::net::{AddressPenaltyBox, AddressRacer, DnsPreference, RacingConnector, SystemResolver};
use crate::observability::AccelStats;
use crate::routing::{PrefixMatcher, RepositoryRegistry};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build TLS client configuration: {0}")]
    Tls(#[from] rustls::Error),
}

pub struct Accelerator {
    config: AccelConfig,
    features: SharedFeatures,
    table: Arc<LatencyTable>,
    probe: Arc<RelayHealthProbe>,
    cache: Arc<ResponseCache>,
    registry: Arc<RepositoryRegistry>,
    stats: Arc<AccelStats>,
    handler: Arc<AccelerationHandler>,
    transport: Arc<dyn Transport>,
    shutdown: Shutdown,
}

impl Accelerator {
    /// Wire every component around `transport`, which serves as the probe's
    /// fetcher and as the default next hop for `send`.
    pub fn new(config: AccelConfig, transport: Arc<dyn Transport>, shutdown: Shutdown) -> Self {
        let features = shared_features(config.features);
        let nodes = nodes_from_config(&config.relays);
        let table = Arc::new(LatencyTable::new(&nodes));

        let probe = Arc::new(RelayHealthProbe::new(
            nodes.clone(),
            Arc::clone(&table),
            Arc::clone(&transport),
            Arc::clone(&features),
            &config.probe,
            &config.handler.user_agent,
        )
        .with_shutdown(shutdown.child()));
        let selector = Arc::new(RelaySelector::new(nodes, Arc::clone(&table), &config.selection));
        let rewriter = Arc::new(RelayRewriter::new(
            selector,
            PrefixMatcher::new(config.handler.upstream_prefixes.clone()),
            Arc::clone(&features),
        ));
        let cache = Arc::new(ResponseCache::new(&config.cache, &config.selection.archive_suffix));
        let registry = Arc::new(RepositoryRegistry::new());
        let stats = Arc::new(AccelStats::new());

        let mut handler = AccelerationHandler::new(
            &config,
            Arc::clone(&features),
            Arc::clone(&cache),
            rewriter,
            Arc::clone(&registry),
            Arc::clone(&probe),
            Arc::clone(&stats),
        );
        if let Some(translator) = load_translator(config.localization.translations_path.as_deref()) {
            handler = handler.with_translator(translator);
        }

        tracing::info!(
            relays = table.len(),
            cache = config.features.response_cache,
            relay = config.features.accelerated_relay,
            "Accelerator initialized"
        );

        Self {
            config,
            features,
            table,
            probe,
            cache,
            registry,
            stats,
            handler: Arc::new(handler),
            transport,
            shutdown,
        }
    }

    /// Production wiring: system resolver, penalty box, racing connector
    /// and a pooled hyper client.
    pub fn with_system_transport(config: AccelConfig, shutdown: Shutdown) -> Result<Self, StartupError> {
        let dns = Arc::new(DnsPreference::new(Arc::new(SystemResolver), &config.dns));
        let penalties = Arc::new(AddressPenaltyBox::new(Duration::from_secs(config.connect.penalty_secs)));
        let racer = Arc::new(AddressRacer::new(dns, penalties, &config.connect));
        let connector = RacingConnector::new(racer, shutdown.child())?;
        let transport = HyperTransport::new(
            connector,
            Duration::from_secs(config.handler.request_timeout_secs),
            Duration::from_secs(config.connect.pool_idle_secs),
        );
        Ok(Self::new(config, Arc::new(transport), shutdown))
    }

    pub fn config(&self) -> &AccelConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<AccelerationHandler> {
        &self.handler
    }

    pub fn probe(&self) -> &Arc<RelayHealthProbe> {
        &self.probe
    }

    pub fn table(&self) -> &Arc<LatencyTable> {
        &self.table
    }

    pub fn registry(&self) -> &Arc<RepositoryRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<AccelStats> {
        &self.stats
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn features(&self) -> FeatureFlags {
        **self.features.load()
    }

    /// Send through the handler with the wired transport.
    pub async fn send(
        &self,
        request: Request<Body>,
        cancel: &CancellationToken,
    ) -> Result<Response<Body>, AccelError> {
        self.handler.send(request, &self.transport, cancel).await
    }

    /// Swap in new flags. Any change drops the response cache.
    pub fn apply_features(&self, flags: FeatureFlags) -> bool {
        let previous = self.features.swap(Arc::new(flags));
        if *previous == flags {
            return false;
        }
        self.cache.clear();
        tracing::info!(
            relay = flags.accelerated_relay,
            cache = flags.response_cache,
            localization = flags.localized_descriptions,
            "Feature flags changed"
        );
        true
    }

    /// Apply the hot part of a reloaded configuration.
    pub fn apply_reload(&self, config: &AccelConfig) {
        if !self.apply_features(config.features) {
            tracing::debug!("Reloaded configuration left feature flags unchanged");
        }
    }

    /// Start the probe ticker; it runs until shutdown.
    pub fn spawn_probe(&self) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.probe).run(self.shutdown.child()))
    }

    pub fn status_state(&self) -> StatusState {
        StatusState {
            stats: Arc::clone(&self.stats),
            cache: Arc::clone(&self.cache),
            table: Arc::clone(&self.table),
            registry: Arc::clone(&self.registry),
            features: Arc::clone(&self.features),
        }
    }
}

fn load_translator(path: Option<&str>) -> Option<Arc<dyn ResponseRewriter>> {
    let path = path?;
    match DescriptionTranslator::load(Path::new(path)) {
        Ok(translator) => Some(Arc::new(translator)),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Translations unavailable, localization disabled");
            None
        }
    }
}
