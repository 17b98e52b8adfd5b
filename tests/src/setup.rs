//! Common test setup functions.

use client::{ClientConfig, ExperimentClient};
use engine_core::{
    Experiment, ManualClock, MemoryStorage, PageContext, PageSnapshot, StaticPageContext,
    StaticProbe, Storage,
};
use experiments::FixedRandom;
use std::sync::Arc;

use crate::fixtures;
use crate::mocks::{MockAssignmentStore, MockExperimentSource, MockSink};

/// A client wired to mocks, with handles to every collaborator.
///
/// Mocks are shared, so several contexts built from one set of mocks
/// behave like successive page loads against the same backend.
pub struct TestContext {
    pub client: ExperimentClient,
    pub sink: MockSink,
    pub source: MockExperimentSource,
    pub store: MockAssignmentStore,
    pub page: Arc<StaticPageContext>,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<dyn Storage>,
    /// Canvas signature the visitor's fingerprint is derived from
    pub visitor: String,
}

/// Builder for [`TestContext`].
pub struct TestContextBuilder {
    sink: MockSink,
    source: MockExperimentSource,
    store: MockAssignmentStore,
    clock: Arc<ManualClock>,
    storage: Arc<dyn Storage>,
    page: PageSnapshot,
    canvas: String,
    roll: f64,
    config: ClientConfig,
}

impl TestContextBuilder {
    pub fn sink(mut self, sink: MockSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn store(mut self, store: MockAssignmentStore) -> Self {
        self.store = store;
        self
    }

    pub fn source(mut self, source: MockExperimentSource) -> Self {
        self.source = source;
        self
    }

    pub fn clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn page(mut self, page: PageSnapshot) -> Self {
        self.page = page;
        self
    }

    /// Distinguishes visitors: each canvas value yields its own fingerprint.
    pub fn visitor(mut self, canvas: &str) -> Self {
        self.canvas = canvas.to_string();
        self
    }

    /// Fixed allocation-gate draw.
    pub fn roll(mut self, roll: f64) -> Self {
        self.roll = roll;
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TestContext {
        let page = Arc::new(StaticPageContext::new(self.page));

        let client = ExperimentClient::builder(
            Arc::new(self.sink.clone()),
            Arc::new(self.source.clone()),
            Arc::new(self.store.clone()),
            page.clone(),
        )
        .storage(self.storage.clone())
        .probe(Arc::new(StaticProbe(fixtures::device(&self.canvas))))
        .clock(self.clock.clone())
        .random(Arc::new(FixedRandom(self.roll)))
        .config(&self.config)
        .build();

        TestContext {
            client,
            sink: self.sink,
            source: self.source,
            store: self.store,
            page,
            clock: self.clock,
            storage: self.storage,
            visitor: self.canvas,
        }
    }
}

impl TestContext {
    /// Context serving `experiments`, on the home page, always inside allocation.
    pub fn builder(experiments: Vec<Experiment>) -> TestContextBuilder {
        TestContextBuilder {
            sink: MockSink::new(),
            source: MockExperimentSource::new(experiments),
            store: MockAssignmentStore::new(),
            clock: Arc::new(ManualClock::default()),
            storage: Arc::new(MemoryStorage::new()),
            page: fixtures::page("/"),
            canvas: "visitor-1".to_string(),
            roll: 0.0,
            config: ClientConfig::default(),
        }
    }

    /// Initialized client for `experiments` with default settings.
    pub async fn start(experiments: Vec<Experiment>) -> Self {
        let ctx = Self::builder(experiments).build();
        ctx.client.initialize().await;
        ctx
    }

    /// Builder for the next page load of the same visitor: same mocks,
    /// storage and clock.
    pub fn next_page_load(&self) -> TestContextBuilder {
        TestContextBuilder {
            sink: self.sink.clone(),
            source: self.source.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
            storage: self.storage.clone(),
            page: self.page.current(),
            canvas: self.visitor.clone(),
            roll: 0.0,
            config: ClientConfig::default(),
        }
    }
}
