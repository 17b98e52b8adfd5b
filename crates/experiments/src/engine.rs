//! Experiment assignment engine.
//!
//! Holds running experiments and this visitor's assignments in memory.
//! Assignment order for `get_variant`:
//! 1. experiment must be running and target the current page
//! 2. an existing assignment (in memory, else from the store) always wins
//! 3. otherwise the allocation gate is rolled for this page view
//! 4. the bucket picks a variant; the assignment is persisted and exposed
//!
//! Nothing here returns an error to the caller. Failures are logged and
//! degrade to "not in experiment".

use chrono::{DateTime, Utc};
use delivery::EventPipeline;
use engine_core::{Assignment, EventType, Experiment, Result, TrackedEvent, Variant};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::bucketing::assign_variant;
use crate::source::{AssignmentStore, ExperimentSource, RandomSource, ThreadRandom};

const EXPERIMENT_CATEGORY: &str = "experiment";

/// Deterministic, sticky variant assignment.
pub struct ExperimentEngine {
    pipeline: EventPipeline,
    source: Arc<dyn ExperimentSource>,
    store: Arc<dyn AssignmentStore>,
    random: Arc<dyn RandomSource>,
    /// Running experiments by name
    experiments: RwLock<HashMap<String, Experiment>>,
    /// Assignments by experiment id
    assignments: Mutex<HashMap<String, Assignment>>,
    /// Experiment ids already exposed by this engine instance
    exposed: Mutex<HashSet<String>>,
}

impl ExperimentEngine {
    pub fn new(
        pipeline: EventPipeline,
        source: Arc<dyn ExperimentSource>,
        store: Arc<dyn AssignmentStore>,
    ) -> Self {
        Self {
            pipeline,
            source,
            store,
            random: Arc::new(ThreadRandom),
            experiments: RwLock::new(HashMap::new()),
            assignments: Mutex::new(HashMap::new()),
            exposed: Mutex::new(HashSet::new()),
        }
    }

    /// Replaces the allocation-gate random source.
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Loads running experiments, replacing what was held before.
    ///
    /// A failed or malformed fetch leaves no experiments loaded. Returns the
    /// number of usable experiments.
    pub async fn load_experiments(&self) -> usize {
        let fetched = match self.source.running_experiments().await {
            Ok(list) => list,
            Err(e) => {
                metrics().experiment_load_failures.inc();
                warn!(error = %e, "Failed to load experiments, running without any");
                Vec::new()
            }
        };

        // Payload order decides: a later entry wins for a repeated id and
        // for a repeated name.
        let mut loaded: HashMap<String, Experiment> = HashMap::new();
        let mut name_of: HashMap<String, String> = HashMap::new();
        for experiment in fetched {
            if !experiment.is_running() {
                debug!(experiment = %experiment.name, status = experiment.status.as_str(), "Skipping experiment that is not running");
                continue;
            }
            if let Err(e) = experiment.check() {
                warn!(error = %e, "Skipping misconfigured experiment");
                continue;
            }

            if let Some(previous) = name_of.insert(experiment.id.clone(), experiment.name.clone()) {
                if previous != experiment.name
                    && loaded.get(&previous).is_some_and(|e| e.id == experiment.id)
                {
                    loaded.remove(&previous);
                }
            }
            if let Some(replaced) = loaded.insert(experiment.name.clone(), experiment) {
                debug!(experiment = %replaced.name, id = %replaced.id, "Replaced by a later entry");
            }
        }

        let count = loaded.len();

        *self.experiments.write() = loaded;
        metrics().experiments_loaded.set(count as u64);
        info!(count, "Experiments loaded");
        count
    }

    /// Variant the visitor sees for an experiment, or `None` if not in it.
    pub async fn get_variant(&self, experiment_name: &str) -> Option<Variant> {
        match self.try_get_variant(experiment_name).await {
            Ok(variant) => variant,
            Err(e) => {
                warn!(experiment = %experiment_name, error = %e, "Variant lookup failed");
                None
            }
        }
    }

    async fn try_get_variant(&self, experiment_name: &str) -> Result<Option<Variant>> {
        let Some(experiment) = self.experiment(experiment_name) else {
            debug!(experiment = %experiment_name, "Unknown or inactive experiment");
            return Ok(None);
        };

        let path = self.pipeline.page().current().path();
        if !experiment.targets_path(&path) {
            debug!(experiment = %experiment_name, path = %path, "Page not targeted");
            return Ok(None);
        }

        let now = self.pipeline.clock().now();

        let existing = match self.bump_existing(&experiment.id, now) {
            Some(assignment) => Some(assignment),
            None => self.restore(&experiment, now).await,
        };
        if let Some(assignment) = existing {
            self.persist(&assignment).await;
            let variant = experiment.variant(&assignment.variant_id).cloned();
            if let Some(variant) = &variant {
                self.expose_once(&experiment, variant, &assignment).await;
            }
            return Ok(variant);
        }

        let roll = self.random.percent();
        if roll >= experiment.traffic_allocation_percent {
            debug!(
                experiment = %experiment_name,
                roll,
                allocation = experiment.traffic_allocation_percent,
                "Outside traffic allocation for this page view"
            );
            return Ok(None);
        }

        let identity = self.pipeline.identity();
        let fingerprint = identity.fingerprint();
        let Some(variant) = assign_variant(&experiment, &fingerprint).cloned() else {
            return Ok(None);
        };

        let candidate = Assignment::new(
            &experiment.id,
            &variant.id,
            identity.session_id(),
            fingerprint,
            self.pipeline.user_id(),
            now,
        );

        let (assignment, created) = match self.assignments.lock().entry(experiment.id.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert(candidate).clone(), true),
        };

        if created {
            info!(experiment = %experiment_name, variant = %variant.name, "Visitor assigned");
            self.persist(&assignment).await;
        }

        let variant = experiment.variant(&assignment.variant_id).cloned();
        if let Some(variant) = &variant {
            self.expose_once(&experiment, variant, &assignment).await;
        }
        Ok(variant)
    }

    /// Records a conversion for the visitor's variant. No-op without an assignment.
    pub async fn track_conversion(
        &self,
        experiment_name: &str,
        goal: &str,
        value: Option<f64>,
        properties: Option<Map<String, Value>>,
    ) {
        let Some((experiment, variant)) = self.assigned(experiment_name) else {
            debug!(experiment = %experiment_name, goal = %goal, "No assignment, conversion ignored");
            return;
        };

        let event = experiment_event(EventType::Conversion, &experiment, &variant, goal, value, properties)
            .property("goal", goal);

        metrics().conversions.inc();
        self.pipeline.track(event).await;
    }

    /// Records a custom event tagged with the visitor's variant. No-op without an assignment.
    pub async fn track_custom_event(
        &self,
        experiment_name: &str,
        event_name: &str,
        value: Option<f64>,
        properties: Option<Map<String, Value>>,
    ) {
        let Some((experiment, variant)) = self.assigned(experiment_name) else {
            debug!(experiment = %experiment_name, event = %event_name, "No assignment, event ignored");
            return;
        };

        let event = experiment_event(
            EventType::ExperimentEvent,
            &experiment,
            &variant,
            event_name,
            value,
            properties,
        )
        .property("event", event_name);

        self.pipeline.track(event).await;
    }

    /// Configuration of the assigned variant.
    pub fn variant_config(&self, experiment_name: &str) -> Option<HashMap<String, Value>> {
        self.assigned(experiment_name)
            .map(|(_, variant)| variant.config)
    }

    pub fn is_in_experiment(&self, experiment_name: &str) -> bool {
        self.assigned(experiment_name).is_some()
    }

    pub fn variant_name(&self, experiment_name: &str) -> Option<String> {
        self.assigned(experiment_name).map(|(_, variant)| variant.name)
    }

    /// Current assignment for an experiment, if any.
    pub fn assignment(&self, experiment_name: &str) -> Option<Assignment> {
        let experiment = self.experiment(experiment_name)?;
        self.assignments.lock().get(&experiment.id).cloned()
    }

    /// Names of the loaded experiments.
    pub fn experiment_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.experiments.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn experiment(&self, name: &str) -> Option<Experiment> {
        self.experiments
            .read()
            .get(name)
            .filter(|e| e.is_running())
            .cloned()
    }

    fn assigned(&self, experiment_name: &str) -> Option<(Experiment, Variant)> {
        let experiment = self.experiment(experiment_name)?;
        let variant_id = self.assignments.lock().get(&experiment.id)?.variant_id.clone();
        let variant = experiment.variant(&variant_id)?.clone();
        Some((experiment, variant))
    }

    fn bump_existing(&self, experiment_id: &str, now: DateTime<Utc>) -> Option<Assignment> {
        let mut assignments = self.assignments.lock();
        let assignment = assignments.get_mut(experiment_id)?;
        assignment.record_exposure(now);
        debug!(experiment_id = %experiment_id, exposures = assignment.exposure_count, "Reusing assignment");
        Some(assignment.clone())
    }

    /// Pulls a prior assignment for this visitor from the store.
    async fn restore(&self, experiment: &Experiment, now: DateTime<Utc>) -> Option<Assignment> {
        let fingerprint = self.pipeline.identity().fingerprint();
        let mut stored = match self.store.find(&experiment.id, &fingerprint).await {
            Ok(found) => found?,
            Err(e) => {
                warn!(experiment = %experiment.name, error = %e, "Assignment lookup failed");
                return None;
            }
        };

        if experiment.variant(&stored.variant_id).is_none() {
            warn!(
                experiment = %experiment.name,
                variant_id = %stored.variant_id,
                "Stored assignment points at a removed variant, reassigning"
            );
            return None;
        }

        stored.record_exposure(now);
        let restored = self
            .assignments
            .lock()
            .entry(experiment.id.clone())
            .or_insert(stored)
            .clone();
        debug!(experiment = %experiment.name, "Restored assignment from store");
        Some(restored)
    }

    async fn persist(&self, assignment: &Assignment) {
        if let Err(e) = self.store.save(assignment).await {
            metrics().assignment_persist_failures.inc();
            warn!(
                experiment_id = %assignment.experiment_id,
                error = %e,
                "Failed to persist assignment, keeping it in memory"
            );
        }
    }

    /// Emits the exposure event once per experiment per engine instance.
    async fn expose_once(&self, experiment: &Experiment, variant: &Variant, assignment: &Assignment) {
        if !self.exposed.lock().insert(experiment.id.clone()) {
            return;
        }

        let event = TrackedEvent::new(EventType::Exposure)
            .category(EXPERIMENT_CATEGORY)
            .action(&experiment.name)
            .label(&variant.name)
            .property("experimentId", experiment.id.as_str())
            .property("experimentName", experiment.name.as_str())
            .property("variantId", variant.id.as_str())
            .property("isControl", variant.is_control)
            .property("exposureCount", assignment.exposure_count);

        metrics().exposures.inc();
        self.pipeline.track(event).await;
    }
}

fn experiment_event(
    event_type: EventType,
    experiment: &Experiment,
    variant: &Variant,
    action: &str,
    value: Option<f64>,
    properties: Option<Map<String, Value>>,
) -> TrackedEvent {
    let mut event = TrackedEvent::new(event_type)
        .category(EXPERIMENT_CATEGORY)
        .action(action)
        .label(&variant.name)
        .property("experimentId", experiment.id.as_str())
        .property("experimentName", experiment.name.as_str())
        .property("variantId", variant.id.as_str());

    if let Some(value) = value {
        event = event.value(value).property("value", value);
    }
    if let Some(properties) = properties {
        event = event.merge_properties(properties);
    }
    event
}
