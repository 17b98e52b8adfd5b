//! Mock implementations for testing.
//!
//! Each mock implements the same trait as its HTTP counterpart, so tests run
//! the production engine code without a network.

use async_trait::async_trait;
use delivery::EventSink;
use engine_core::{Assignment, EnrichedEvent, Error, Experiment, Result};
use experiments::{AssignmentStore, ExperimentSource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sink that captures delivered and beaconed events in memory.
#[derive(Clone, Default)]
pub struct MockSink {
    delivered: Arc<Mutex<Vec<EnrichedEvent>>>,
    beacons: Arc<Mutex<Vec<EnrichedEvent>>>,
    /// Network calls made through `deliver`, including failed ones
    calls: Arc<AtomicUsize>,
    should_fail: Arc<Mutex<bool>>,
    latency: Arc<Mutex<Duration>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all delivered events.
    pub fn delivered(&self) -> Vec<EnrichedEvent> {
        self.delivered.lock().clone()
    }

    /// Delivered events of one type.
    pub fn delivered_of_type(&self, event_type: &str) -> Vec<EnrichedEvent> {
        self.delivered
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.delivered
            .lock()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    pub fn beacons(&self) -> Vec<EnrichedEvent> {
        self.beacons.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    /// Delay every delivery, keeping it in flight for that long.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }
}

#[async_trait]
impl EventSink for MockSink {
    async fn deliver(&self, event: &EnrichedEvent) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if *self.should_fail.lock() {
            return Err(Error::internal("Mock sink failure"));
        }
        self.delivered.lock().push(event.clone());
        Ok(())
    }

    fn beacon(&self, event: &EnrichedEvent) -> Result<()> {
        if *self.should_fail.lock() {
            return Err(Error::internal("Mock beacon failure"));
        }
        self.beacons.lock().push(event.clone());
        Ok(())
    }
}

/// Experiment source serving a fixed, replaceable list.
#[derive(Clone, Default)]
pub struct MockExperimentSource {
    experiments: Arc<Mutex<Vec<Experiment>>>,
    loads: Arc<AtomicUsize>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockExperimentSource {
    pub fn new(experiments: Vec<Experiment>) -> Self {
        Self {
            experiments: Arc::new(Mutex::new(experiments)),
            ..Default::default()
        }
    }

    pub fn set_experiments(&self, experiments: Vec<Experiment>) {
        *self.experiments.lock() = experiments;
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

#[async_trait]
impl ExperimentSource for MockExperimentSource {
    async fn running_experiments(&self) -> Result<Vec<Experiment>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if *self.should_fail.lock() {
            return Err(Error::internal("Mock experiment source failure"));
        }
        Ok(self.experiments.lock().clone())
    }
}

/// Assignment store keyed by (experiment id, fingerprint).
#[derive(Clone, Default)]
pub struct MockAssignmentStore {
    assignments: Arc<Mutex<HashMap<(String, String), Assignment>>>,
    writes: Arc<AtomicUsize>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, experiment_id: &str, fingerprint: &str) -> Option<Assignment> {
        self.assignments
            .lock()
            .get(&(experiment_id.to_string(), fingerprint.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.assignments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Fail every read and write.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

#[async_trait]
impl AssignmentStore for MockAssignmentStore {
    async fn find(&self, experiment_id: &str, fingerprint: &str) -> Result<Option<Assignment>> {
        if *self.should_fail.lock() {
            return Err(Error::internal("Mock assignment store failure"));
        }
        Ok(self.get(experiment_id, fingerprint))
    }

    async fn save(&self, assignment: &Assignment) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if *self.should_fail.lock() {
            return Err(Error::internal("Mock assignment store failure"));
        }
        self.assignments.lock().insert(
            (assignment.experiment_id.clone(), assignment.fingerprint.clone()),
            assignment.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use chrono::Utc;

    #[tokio::test]
    async fn test_mock_store_round_trip() {
        let store = MockAssignmentStore::new();
        let assignment = Assignment::new("exp-1", "v1", "sess-1", "fp-1", None, Utc::now());

        store.save(&assignment).await.unwrap();
        assert_eq!(store.find("exp-1", "fp-1").await.unwrap(), Some(assignment));
        assert!(store.find("exp-1", "fp-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mock_store_failure_mode() {
        let store = MockAssignmentStore::new();
        store.set_should_fail(true);

        let assignment = Assignment::new("exp-1", "v1", "sess-1", "fp-1", None, Utc::now());
        assert!(store.save(&assignment).await.is_err());
        assert!(store.is_empty());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_source_counts_loads() {
        let source = MockExperimentSource::new(vec![fixtures::hero_cta()]);
        assert_eq!(source.running_experiments().await.unwrap().len(), 1);

        source.set_should_fail(true);
        assert!(source.running_experiments().await.is_err());
        assert_eq!(source.load_count(), 2);
    }
}
