//! Event delivery pipeline.
//!
//! `track` enriches an event, then either joins an identical delivery that is
//! still in flight or starts a new one. Deliveries run as detached tasks, so
//! they finish even if every caller stops waiting, and each removes its dedup
//! entry when it settles. Failures are logged and counted, never returned.

use chrono::{DateTime, Utc};
use engine_core::{
    Clock, DeviceContext, EnrichedEvent, EventContext, GeoProvider, IdentityStore, NoGeo,
    PageContext, Result, SystemClock, TrackedEvent,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, error, warn};

use crate::config::DeliveryConfig;
use crate::dedup::DedupKey;
use crate::sink::EventSink;

type Pending = Shared<BoxFuture<'static, ()>>;

/// Deduplicating, never-failing event transport.
///
/// Cloning is cheap and clones share the dedup cache. Deliveries are
/// spawned on the current tokio runtime when there is one.
#[derive(Clone)]
pub struct EventPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Arc<dyn EventSink>,
    identity: Arc<IdentityStore>,
    page: Arc<dyn PageContext>,
    geo: Arc<dyn GeoProvider>,
    clock: Arc<dyn Clock>,
    device: DeviceContext,
    dedup_window_ms: u64,
    user_id: RwLock<Option<String>>,
    inflight: Mutex<HashMap<DedupKey, Pending>>,
}

/// Builder for [`EventPipeline`].
pub struct PipelineBuilder {
    sink: Arc<dyn EventSink>,
    identity: Arc<IdentityStore>,
    page: Arc<dyn PageContext>,
    geo: Arc<dyn GeoProvider>,
    clock: Arc<dyn Clock>,
    dedup_window_ms: u64,
    user_id: Option<String>,
}

impl PipelineBuilder {
    pub fn geo(mut self, geo: Arc<dyn GeoProvider>) -> Self {
        self.geo = geo;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: &DeliveryConfig) -> Self {
        self.dedup_window_ms = config.dedup_window_ms;
        self
    }

    pub fn user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn build(self) -> EventPipeline {
        EventPipeline {
            inner: Arc::new(Inner {
                sink: self.sink,
                identity: self.identity,
                page: self.page,
                geo: self.geo,
                clock: self.clock,
                device: DeviceContext::new(),
                dedup_window_ms: self.dedup_window_ms,
                user_id: RwLock::new(self.user_id),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl EventPipeline {
    pub fn builder(
        sink: Arc<dyn EventSink>,
        identity: Arc<IdentityStore>,
        page: Arc<dyn PageContext>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            sink,
            identity,
            page,
            geo: Arc::new(NoGeo),
            clock: Arc::new(SystemClock),
            dedup_window_ms: DeliveryConfig::default().dedup_window_ms,
            user_id: None,
        }
    }

    /// Tracks an event. Resolves once this delivery, or the identical one
    /// it joined, has settled.
    pub async fn track(&self, event: TrackedEvent) {
        metrics().events_tracked.inc();

        let now = self.inner.clock.now();
        let key = DedupKey::new(&event, now, self.inner.dedup_window_ms);
        let enriched = self.inner.enrich(event, now);

        let pending = {
            let mut inflight = self.inner.inflight.lock();
            match inflight.get(&key) {
                Some(pending) => {
                    metrics().events_deduplicated.inc();
                    debug!(key = %key.as_str(), "Joining in-flight delivery");
                    pending.clone()
                }
                None => {
                    // Spawned while the lock is held, so the task cannot
                    // settle before its entry exists.
                    let pending = self.spawn_delivery(key.clone(), enriched);
                    inflight.insert(key, pending.clone());
                    pending
                }
            }
        };

        pending.await;
    }

    /// Sends an event during page teardown.
    ///
    /// Skips the dedup cache and does not wait for the network.
    pub fn track_on_unload(&self, event: TrackedEvent) {
        if let Err(e) = self.try_beacon(event) {
            metrics().beacon_failures.inc();
            warn!(error = %e, "Unload event dropped");
        }
    }

    fn try_beacon(&self, event: TrackedEvent) -> Result<()> {
        let now = self.inner.clock.now();
        let enriched = self.inner.enrich(event, now);
        self.inner.sink.beacon(&enriched)?;
        metrics().beacons_sent.inc();
        debug!(event_type = %enriched.event_type, "Beacon dispatched");
        Ok(())
    }

    fn spawn_delivery(&self, key: DedupKey, event: EnrichedEvent) -> Pending {
        let inner = self.inner.clone();
        metrics().inflight_deliveries.inc();

        let work = async move {
            let _settle = Settle {
                inner: inner.clone(),
                key,
            };
            let event_type = event.event_type.clone();
            if let Err(e) = inner.deliver(event).await {
                metrics().delivery_failures.inc();
                if e.is_transient() {
                    warn!(error = %e, event_type = %event_type, "Event delivery failed");
                } else {
                    error!(error = %e, event_type = %event_type, "Event delivery failed");
                }
            }
        };

        // Without a runtime the delivery runs on the caller's poll instead.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No tokio runtime, delivering inline");
            return work.boxed().shared();
        };

        let handle = runtime.spawn(work);
        async move {
            if let Err(e) = handle.await {
                warn!(error = %e, "Delivery task did not complete");
            }
        }
        .boxed()
        .shared()
    }

    /// Sets the logged-in user attached to later events.
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.inner.user_id.write() = user_id;
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.user_id.read().clone()
    }

    /// Number of deliveries still in flight.
    pub fn inflight(&self) -> usize {
        self.inner.inflight.lock().len()
    }

    pub fn identity(&self) -> &Arc<IdentityStore> {
        &self.inner.identity
    }

    pub fn page(&self) -> &Arc<dyn PageContext> {
        &self.inner.page
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }
}

impl Inner {
    fn enrich(&self, event: TrackedEvent, at: DateTime<Utc>) -> EnrichedEvent {
        let ctx = EventContext {
            session_id: self.identity.session_id(),
            fingerprint: self.identity.fingerprint(),
            user_id: self.user_id.read().clone(),
            page: self.page.current(),
            device: self.device.snapshot(self.identity.probe()),
            location: self.geo.location(),
        };
        EnrichedEvent::new(event, ctx, at)
    }

    async fn deliver(&self, event: EnrichedEvent) -> Result<()> {
        let start = Instant::now();
        self.sink.deliver(&event).await?;

        metrics().events_delivered.inc();
        metrics()
            .delivery_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        Ok(())
    }
}

/// Removes a dedup entry when its delivery settles, success or not.
struct Settle {
    inner: Arc<Inner>,
    key: DedupKey,
}

impl Drop for Settle {
    fn drop(&mut self) {
        self.inner.inflight.lock().remove(&self.key);
        metrics().inflight_deliveries.dec();
    }
}
