//! Experiment client: the surface UI code talks to.
//!
//! Nothing on this type returns an error or panics. Failures inside the
//! engine are logged and show up as "not in experiment" or a dropped event.

use chrono::{DateTime, Utc};
use delivery::{EventPipeline, EventSink, HttpSink};
use engine_core::{
    Clock, DeviceProbe, FileStorage, GeoProvider, IdentityStore, MemoryStorage, NoGeo,
    PageContext, Result, StaticPageContext, StaticProbe, Storage, SystemClock, Variant,
};
use experiments::{
    AssignmentStore, ExperimentEngine, ExperimentSource, HttpExperimentBackend, RandomSource,
    ThreadRandom,
};
use lifecycle::{PageLifecycleTracker, ScrollPosition};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::ClientConfig;

/// Browser-side signals the host forwards once the client is initialized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageSignal {
    Scroll(ScrollPosition),
    VisibilityChange { hidden: bool },
    BeforeUnload,
    PageHide,
}

/// Entry point for experiments and page telemetry on one page load.
pub struct ExperimentClient {
    pipeline: EventPipeline,
    engine: ExperimentEngine,
    tracker: PageLifecycleTracker,
    navigation_start: Option<DateTime<Utc>>,
    initialized: OnceCell<()>,
}

/// Builder for [`ExperimentClient`].
pub struct ClientBuilder {
    sink: Arc<dyn EventSink>,
    source: Arc<dyn ExperimentSource>,
    store: Arc<dyn AssignmentStore>,
    page: Arc<dyn PageContext>,
    storage: Arc<dyn Storage>,
    probe: Arc<dyn DeviceProbe>,
    clock: Arc<dyn Clock>,
    geo: Arc<dyn GeoProvider>,
    random: Arc<dyn RandomSource>,
    config: ClientConfig,
    navigation_start: Option<DateTime<Utc>>,
}

impl ClientBuilder {
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn DeviceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn geo(mut self, geo: Arc<dyn GeoProvider>) -> Self {
        self.geo = geo;
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Applies dedup window, session timeout and user id.
    pub fn config(mut self, config: &ClientConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// When the host started loading the page. Defaults to when the client
    /// was built.
    pub fn navigation_start(mut self, at: DateTime<Utc>) -> Self {
        self.navigation_start = Some(at);
        self
    }

    pub fn build(self) -> ExperimentClient {
        let identity = Arc::new(
            IdentityStore::new(self.storage, self.clock.clone(), self.probe)
                .with_timeout(self.config.session_timeout()),
        );

        let pipeline = EventPipeline::builder(self.sink, identity, self.page)
            .geo(self.geo)
            .clock(self.clock)
            .config(&self.config.delivery())
            .user_id(self.config.user_id.clone())
            .build();

        let engine = ExperimentEngine::new(pipeline.clone(), self.source, self.store)
            .with_random(self.random);
        let tracker = PageLifecycleTracker::new(pipeline.clone());

        ExperimentClient {
            pipeline,
            engine,
            tracker,
            navigation_start: self.navigation_start,
            initialized: OnceCell::new(),
        }
    }
}

impl ExperimentClient {
    pub fn builder(
        sink: Arc<dyn EventSink>,
        source: Arc<dyn ExperimentSource>,
        store: Arc<dyn AssignmentStore>,
        page: Arc<dyn PageContext>,
    ) -> ClientBuilder {
        ClientBuilder {
            sink,
            source,
            store,
            page,
            storage: Arc::new(MemoryStorage::new()),
            probe: Arc::new(StaticProbe::default()),
            clock: Arc::new(SystemClock),
            geo: Arc::new(NoGeo),
            random: Arc::new(ThreadRandom),
            config: ClientConfig::default(),
            navigation_start: None,
        }
    }

    /// Client wired to the HTTP backend named in `config`.
    pub fn from_config(config: &ClientConfig, probe: Arc<dyn DeviceProbe>) -> Result<Self> {
        let sink = Arc::new(HttpSink::new(&config.delivery())?);
        let backend = Arc::new(HttpExperimentBackend::new(&config.backend())?);
        let page = Arc::new(StaticPageContext::new(config.page.snapshot()));

        let storage: Arc<dyn Storage> = match &config.storage_path {
            Some(path) => Arc::new(FileStorage::new(path)),
            None => Arc::new(MemoryStorage::new()),
        };

        Ok(Self::builder(sink, backend.clone(), backend, page)
            .storage(storage)
            .probe(probe)
            .config(config)
            .build())
    }

    /// Sets up the session, loads experiments and records the page view.
    ///
    /// Runs once per client. Later and concurrent calls wait for the first.
    pub async fn initialize(&self) {
        self.initialized
            .get_or_init(|| async {
                let session = self.pipeline.identity().session();
                info!(
                    session_id = %session.id,
                    degraded = self.pipeline.identity().is_degraded(),
                    "Session ready"
                );

                let experiments = self.engine.load_experiments().await;
                self.tracker.on_load(self.navigation_start).await;

                info!(experiments, "Experiment client initialized");
            })
            .await;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Dispatches a page signal to the lifecycle tracker.
    ///
    /// Signals before `initialize` are dropped.
    pub async fn handle(&self, signal: PageSignal) {
        if !self.is_initialized() {
            debug!(?signal, "Page signal before initialize, ignoring");
            return;
        }

        match signal {
            PageSignal::Scroll(position) => {
                self.tracker.on_scroll(position.percent()).await;
            }
            PageSignal::VisibilityChange { hidden } => {
                self.tracker.on_visibility_change(hidden).await;
            }
            PageSignal::BeforeUnload | PageSignal::PageHide => {
                self.tracker.on_exit();
            }
        }
    }

    /// Variant shown to this visitor, or `None` when not in the experiment.
    pub async fn get_variant(&self, experiment_name: &str) -> Option<Variant> {
        self.engine.get_variant(experiment_name).await
    }

    pub async fn track_conversion(
        &self,
        experiment_name: &str,
        goal: &str,
        value: Option<f64>,
        properties: Option<Map<String, Value>>,
    ) {
        self.engine
            .track_conversion(experiment_name, goal, value, properties)
            .await;
    }

    pub async fn track_custom_event(
        &self,
        experiment_name: &str,
        event_name: &str,
        value: Option<f64>,
        properties: Option<Map<String, Value>>,
    ) {
        self.engine
            .track_custom_event(experiment_name, event_name, value, properties)
            .await;
    }

    pub fn get_variant_config(&self, experiment_name: &str) -> Option<HashMap<String, Value>> {
        self.engine.variant_config(experiment_name)
    }

    pub fn is_in_experiment(&self, experiment_name: &str) -> bool {
        self.engine.is_in_experiment(experiment_name)
    }

    pub fn get_variant_name(&self, experiment_name: &str) -> Option<String> {
        self.engine.variant_name(experiment_name)
    }

    /// Reloads running experiments. Existing assignments are kept.
    pub async fn refresh_experiments(&self) -> usize {
        self.engine.load_experiments().await
    }

    /// Attaches a logged-in user to later events and assignments.
    pub fn set_user_id(&self, user_id: Option<String>) {
        self.pipeline.set_user_id(user_id);
    }

    pub fn session_id(&self) -> String {
        self.pipeline.identity().session_id()
    }

    pub fn fingerprint(&self) -> String {
        self.pipeline.identity().fingerprint()
    }

    pub fn engine(&self) -> &ExperimentEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &PageLifecycleTracker {
        &self.tracker
    }

    pub fn pipeline(&self) -> &EventPipeline {
        &self.pipeline
    }
}
