//! Bandit client: owns configuration, drives the
//! `Preload → Wait → Selecting → Ready` lifecycle, runs selection and forwards
//! metrics. Every failure converges on `Ready` with some variant selected.

use crate::source::{HttpSiteSource, SiteRequest, SiteSource};
use crate::state::{ClientState, SelectionSource};
use bandit_algorithms::{AlgorithmRegistry, SelectionArgs, ThreadRandom};
use bandit_core::constants::DEFAULT_VARIANT_NAME;
use bandit_core::{BanditError, ClientConfig, LoadState, MetricsSample, SessionPatch, Site, Variant};
use bandit_metrics::{HttpMetricsSink, MetricsQueue, MetricsSink};
use bandit_session::{FileBackend, SessionStore};
use chrono::Utc;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Invoked once per transition into `Ready`.
pub type ReadyCallback = Arc<dyn Fn(&ClientState) -> anyhow::Result<()> + Send + Sync>;
/// Invoked once per failed load, after the fallback site has been selected.
pub type ErrorCallback =
    Arc<dyn Fn(&BanditError, &ClientState) -> anyhow::Result<()> + Send + Sync>;

pub struct BanditClient {
    config: Arc<ClientConfig>,
    algorithms: AlgorithmRegistry,
    source: Arc<dyn SiteSource>,
    sessions: Arc<SessionStore>,
    metrics: MetricsQueue,
    site: Option<String>,
    select: Option<String>,
    on_ready: Option<ReadyCallback>,
    on_error: Option<ErrorCallback>,
    state: watch::Sender<ClientState>,
    load_gate: tokio::sync::Mutex<()>,
    completed_loads: AtomicU64,
}

impl BanditClient {
    pub fn builder(config: ClientConfig) -> BanditClientBuilder {
        BanditClientBuilder::new(config)
    }

    /// Client with HTTP transports and an in-memory session store.
    pub fn new(config: ClientConfig) -> Self {
        Self::builder(config).build()
    }

    /// Fetch the site document and select a variant.
    ///
    /// Concurrent calls share one fetch: callers that arrive while a load is
    /// in flight wait for it and receive its result.
    pub async fn load(&self) -> ClientState {
        self.load_with(None).await
    }

    /// Like [`load`](Self::load) with an explicit variant override.
    pub async fn load_with(&self, select: Option<&str>) -> ClientState {
        let seen = self.completed_loads.load(Ordering::Acquire);
        let _gate = self.load_gate.lock().await;
        if self.completed_loads.load(Ordering::Acquire) != seen {
            debug!("Joined an in-flight load");
            return self.state();
        }

        let explicit = select.map(str::to_string).or_else(|| self.select.clone());
        self.transition(|s| {
            s.state = LoadState::Wait;
            s.error = None;
        });

        let request = SiteRequest {
            site: self.site.clone(),
            select: explicit.clone(),
            session: self
                .sessions
                .get(&self.config.origin)
                .map(|s| s.sid)
                .filter(|sid| !sid.is_empty()),
        };

        let state = match self.source.fetch(&request).await {
            Ok(site) => {
                metrics::counter!("bandit.site.fetched").increment(1);
                info!(site = %site.name, variants = site.variants.len(), "Loaded site");
                self.init(site, explicit.as_deref())
            }
            Err(e) => {
                metrics::counter!("bandit.site.fetch_errors").increment(1);
                warn!(error = %e, "Error loading site, using fallback");
                self.recover(e, explicit.as_deref())
            }
        };

        self.completed_loads.fetch_add(1, Ordering::Release);
        state
    }

    /// Select a variant from an already available site document.
    pub fn init(&self, site: Site, select: Option<&str>) -> ClientState {
        let state = self.apply(site, select, None);
        self.notify_ready(&state);
        state
    }

    fn recover(&self, error: BanditError, select: Option<&str>) -> ClientState {
        let error = Arc::new(error);
        let state = self.apply(Site::fallback(), select, Some(error.clone()));

        if let Some(on_error) = &self.on_error {
            guard_callback("error", || on_error(error.as_ref(), &state));
        }
        self.notify_ready(&state);
        state
    }

    fn apply(
        &self,
        site: Site,
        select: Option<&str>,
        error: Option<Arc<BanditError>>,
    ) -> ClientState {
        self.transition(|s| s.state = LoadState::Selecting);

        let (variant, selection) = self.select_variant(&site, select);
        let session = self.sessions.upsert(&SessionPatch {
            origin: Some(self.config.origin.clone()),
            site: Some(site.name.clone()),
            variant: Some(variant.name.clone()),
            ..Default::default()
        });
        self.metrics.set_scope(&site.name, &variant.name);

        info!(
            site = %site.name,
            variant = %variant.name,
            selection = ?selection,
            "Bandit selects variant"
        );

        let site = Arc::new(site);
        self.transition(move |s| {
            s.state = LoadState::Ready;
            s.error = error;
            s.site = Some(site);
            s.variant = Some(variant);
            s.selection = Some(selection);
            s.session = Some(session);
        })
    }

    /// Explicit override, then the site's own `select`, then the default
    /// algorithm, then the invariant variant.
    fn select_variant(&self, site: &Site, select: Option<&str>) -> (Variant, SelectionSource) {
        if !site.is_usable() {
            return self.fallback(site, DEFAULT_VARIANT_NAME);
        }

        let mut missing: Option<&str> = None;
        if let Some(name) = select {
            if let Some(variant) = site.variant(name) {
                return (variant.clone(), SelectionSource::Explicit);
            }
            warn!(variant = %name, site = %site.name, "Explicitly selected variant not found");
            missing = Some(name);
        }
        if let Some(name) = site.select.as_deref() {
            if let Some(variant) = site.variant(name) {
                return (variant.clone(), SelectionSource::Site);
            }
            warn!(variant = %name, site = %site.name, "Site-selected variant not found");
            missing = missing.or(Some(name));
        }
        // A requested name that does not exist is not handed to the algorithm.
        if let Some(name) = missing {
            return self.fallback(site, name);
        }

        let algorithm = &self.config.default_algorithm;
        let winner = self
            .algorithms
            .create(algorithm)
            .and_then(|algo| algo.select(&site.variants, &SelectionArgs::default()));
        match winner {
            Ok(result) => match site.variant(&result.winner.name) {
                Some(variant) => {
                    return (variant.clone(), SelectionSource::Algorithm(algorithm.clone()))
                }
                None => return self.fallback(site, &result.winner.name),
            },
            Err(e) => warn!(algorithm = %algorithm, error = %e, "Selection algorithm failed"),
        }
        self.fallback(site, algorithm)
    }

    fn fallback(&self, site: &Site, requested: &str) -> (Variant, SelectionSource) {
        metrics::counter!("bandit.selection.fallback").increment(1);
        warn!(
            requested = %requested,
            "Could not find variant '{}', falling back to '{}'",
            requested,
            DEFAULT_VARIANT_NAME
        );
        let variant = site
            .variant(DEFAULT_VARIANT_NAME)
            .cloned()
            .unwrap_or_else(Variant::invariant);
        (
            variant,
            SelectionSource::Fallback {
                requested: requested.to_string(),
            },
        )
    }

    fn notify_ready(&self, state: &ClientState) {
        if let Some(on_ready) = &self.on_ready {
            guard_callback("ready", || on_ready(state));
        }
    }

    fn transition(&self, f: impl FnOnce(&mut ClientState)) -> ClientState {
        self.state.send_modify(f);
        self.state.borrow().clone()
    }

    /// Queue a metrics sample for batched delivery.
    pub async fn push(&self, sample: MetricsSample) {
        self.metrics.push(sample).await;
    }

    /// Queue `metric = value` for the current origin, session, site and variant.
    pub async fn record(&self, metric: &str, value: f64) {
        let state = self.state();
        let sample = MetricsSample {
            timestamp: Utc::now(),
            origin: self.config.origin.clone(),
            session: state.session.map(|s| s.sid).unwrap_or_default(),
            site: state.site.map(|s| s.name.clone()).unwrap_or_default(),
            variant: state
                .variant
                .map(|v| v.name)
                .unwrap_or_else(|| DEFAULT_VARIANT_NAME.to_string()),
            metric: metric.to_string(),
            value,
        };
        self.push(sample).await;
    }

    pub async fn flush(&self) {
        self.metrics.flush().await;
    }

    /// Current lifecycle snapshot.
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    pub fn load_state(&self) -> LoadState {
        self.state.borrow().state
    }

    pub fn site(&self) -> Option<Arc<Site>> {
        self.state.borrow().site.clone()
    }

    pub fn variant(&self) -> Option<Variant> {
        self.state.borrow().variant.clone()
    }

    pub fn error(&self) -> Option<Arc<BanditError>> {
        self.state.borrow().error.clone()
    }

    /// Receiver notified on every lifecycle transition.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn origin(&self) -> &str {
        &self.config.origin
    }

    pub fn metrics(&self) -> &MetricsQueue {
        &self.metrics
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

fn guard_callback(event: &str, f: impl FnOnce() -> anyhow::Result<()>) {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(event = event, error = %e, "Callback returned an error"),
        Err(_) => warn!(event = event, "Callback panicked"),
    }
}

pub struct BanditClientBuilder {
    config: ClientConfig,
    algorithms: Option<AlgorithmRegistry>,
    source: Option<Arc<dyn SiteSource>>,
    sessions: Option<Arc<SessionStore>>,
    sink: Option<Arc<dyn MetricsSink>>,
    site: Option<String>,
    select: Option<String>,
    on_ready: Option<ReadyCallback>,
    on_error: Option<ErrorCallback>,
}

impl BanditClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            algorithms: None,
            source: None,
            sessions: None,
            sink: None,
            site: None,
            select: None,
            on_ready: None,
            on_error: None,
        }
    }

    pub fn algorithms(mut self, registry: AlgorithmRegistry) -> Self {
        self.algorithms = Some(registry);
        self
    }

    pub fn source(mut self, source: Arc<dyn SiteSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Share a session store between clients of the same process.
    pub fn sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Name of the site to request from the selection service.
    pub fn site(mut self, name: impl Into<String>) -> Self {
        self.site = Some(name.into());
        self
    }

    /// Force a variant for every load of this client.
    pub fn select(mut self, variant: impl Into<String>) -> Self {
        self.select = Some(variant.into());
        self
    }

    pub fn on_ready<F>(mut self, f: F) -> Self
    where
        F: Fn(&ClientState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_ready = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&BanditError, &ClientState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> BanditClient {
        let config = Arc::new(self.config);

        let source = match self.source {
            Some(source) => source,
            None => Arc::new(HttpSiteSource::new(&config)),
        };
        let sink = match self.sink {
            Some(sink) => sink,
            None => Arc::new(HttpMetricsSink::new(&config)),
        };
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(default_sessions(&config)));
        let algorithms = self.algorithms.unwrap_or_else(|| {
            AlgorithmRegistry::with_random_source(Arc::new(ThreadRandom), config.epsilon)
        });
        if !algorithms.contains(&config.default_algorithm) {
            warn!(
                algorithm = %config.default_algorithm,
                "Default algorithm is not registered, selection will fall back"
            );
        }

        let (state, _) = watch::channel(ClientState::default());

        BanditClient {
            metrics: MetricsQueue::new(&config, sink),
            config,
            algorithms,
            source,
            sessions,
            site: self.site,
            select: self.select,
            on_ready: self.on_ready,
            on_error: self.on_error,
            state,
            load_gate: tokio::sync::Mutex::new(()),
            completed_loads: AtomicU64::new(0),
        }
    }
}

fn default_sessions(config: &ClientConfig) -> SessionStore {
    let Some(dir) = &config.session_dir else {
        return SessionStore::in_memory();
    };
    match FileBackend::new(dir) {
        Ok(backend) => SessionStore::new(Arc::new(backend)),
        Err(e) => {
            warn!(
                dir = %dir.display(),
                error = %e,
                "Session directory unavailable, keeping sessions in memory"
            );
            SessionStore::in_memory()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSiteSource;
    use bandit_algorithms::FixedRandom;
    use bandit_metrics::CaptureSink;

    fn site_ab() -> Site {
        Site::new("test-ab", vec![Variant::new("A"), Variant::new("B")])
    }

    fn client_with(site: Site, draw: f64) -> BanditClient {
        BanditClient::builder(ClientConfig::default())
            .source(Arc::new(StaticSiteSource::new(site)))
            .metrics_sink(Arc::new(CaptureSink::new()))
            .algorithms(AlgorithmRegistry::with_random_source(
                Arc::new(FixedRandom(draw)),
                0.02,
            ))
            .build()
    }

    #[test]
    fn test_starts_in_preload() {
        let client = client_with(site_ab(), 0.0);
        assert_eq!(client.load_state(), LoadState::Preload);
        assert!(client.variant().is_none());
    }

    #[test]
    fn test_init_honours_explicit_selection() {
        let client = client_with(site_ab(), 0.0);
        let state = client.init(site_ab(), Some("B"));
        assert_eq!(state.state, LoadState::Ready);
        assert_eq!(state.variant_name(), Some("B"));
        assert_eq!(state.selection, Some(SelectionSource::Explicit));
    }

    #[test]
    fn test_explicit_selection_beats_site_select() {
        let client = client_with(site_ab(), 0.0);
        let mut site = site_ab();
        site.select = Some("A".into());
        let state = client.init(site, Some("B"));
        assert_eq!(state.variant_name(), Some("B"));
    }

    #[test]
    fn test_site_select_beats_algorithm() {
        let client = client_with(site_ab(), 0.99);
        let mut site = site_ab();
        site.select = Some("A".into());
        let state = client.init(site, None);
        assert_eq!(state.variant_name(), Some("A"));
        assert_eq!(state.selection, Some(SelectionSource::Site));
    }

    #[test]
    fn test_missing_explicit_falls_through_to_site_select() {
        let client = client_with(site_ab(), 0.0);
        let mut site = site_ab();
        site.select = Some("B".into());
        let state = client.init(site, Some("Z"));
        assert_eq!(state.variant_name(), Some("B"));
    }

    #[test]
    fn test_algorithm_uses_random_source() {
        let client = client_with(site_ab(), 0.99);
        let state = client.init(site_ab(), None);
        assert_eq!(state.variant_name(), Some("B"));
        assert_eq!(
            state.selection,
            Some(SelectionSource::Algorithm("random".into()))
        );
    }

    #[test]
    fn test_unknown_site_select_falls_back_with_warning() {
        let client = client_with(site_ab(), 0.99);
        let mut site = site_ab();
        site.select = Some("Z".into());
        let state = client.init(site, None);
        assert_eq!(state.variant_name(), Some("default"));
        assert_eq!(
            state.selection,
            Some(SelectionSource::Fallback {
                requested: "Z".into()
            })
        );
        assert!(state.is_ready());
    }

    #[test]
    fn test_empty_site_falls_back() {
        let client = client_with(site_ab(), 0.5);
        let state = client.init(Site::new("empty", vec![]), None);
        assert_eq!(state.variant_name(), Some("default"));
        assert!(state.is_fallback());
    }

    #[test]
    fn test_unregistered_algorithm_falls_back() {
        let client = BanditClient::builder(ClientConfig {
            default_algorithm: "thompson".into(),
            ..Default::default()
        })
        .source(Arc::new(StaticSiteSource::new(site_ab())))
        .metrics_sink(Arc::new(CaptureSink::new()))
        .build();
        let state = client.init(site_ab(), None);
        assert_eq!(state.variant_name(), Some("default"));
        assert_eq!(
            state.selection,
            Some(SelectionSource::Fallback {
                requested: "thompson".into()
            })
        );
    }

    #[test]
    fn test_selection_is_persisted_to_session() {
        let client = client_with(site_ab(), 0.0);
        client.init(site_ab(), Some("B"));
        let session = client.sessions().get("default").unwrap();
        assert_eq!(session.variant, "B");
        assert_eq!(session.site, "test-ab");
        assert_eq!(client.metrics().scope().variant, "B");
    }

    #[test]
    fn test_ready_callback_errors_are_contained() {
        let client = BanditClient::builder(ClientConfig::default())
            .source(Arc::new(StaticSiteSource::new(site_ab())))
            .metrics_sink(Arc::new(CaptureSink::new()))
            .on_ready(|_| Err(anyhow::anyhow!("handler failed")))
            .build();
        let state = client.init(site_ab(), Some("A"));
        assert!(state.is_ready());
    }

    #[test]
    fn test_ready_callback_panics_are_contained() {
        let client = BanditClient::builder(ClientConfig::default())
            .source(Arc::new(StaticSiteSource::new(site_ab())))
            .metrics_sink(Arc::new(CaptureSink::new()))
            .on_ready(|_| panic!("handler exploded"))
            .build();
        let state = client.init(site_ab(), Some("A"));
        assert!(state.is_ready());
        assert_eq!(client.variant().map(|v| v.name), Some("A".to_string()));
    }
}
