//! In-process metrics for the experimentation engine.
//!
//! Counters are process-wide atomics. Hosts read them with
//! [`Metrics::snapshot`] and forward them however they like.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements, stopping at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }
}

/// Histogram for delivery latency.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 10ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
    buckets: [AtomicU64; 9],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 9] = [10, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    /// Returns (upper bound, count) pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Delivery pipeline
    pub events_tracked: Counter,
    pub events_delivered: Counter,
    pub events_deduplicated: Counter,
    pub delivery_failures: Counter,
    pub beacons_sent: Counter,
    pub beacon_failures: Counter,

    // Experiments
    pub experiments_loaded: Gauge,
    pub experiment_load_failures: Counter,
    pub exposures: Counter,
    pub conversions: Counter,
    pub assignment_persist_failures: Counter,

    pub delivery_latency_ms: Histogram,
    pub inflight_deliveries: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_tracked: self.events_tracked.get(),
            events_delivered: self.events_delivered.get(),
            events_deduplicated: self.events_deduplicated.get(),
            delivery_failures: self.delivery_failures.get(),
            beacons_sent: self.beacons_sent.get(),
            beacon_failures: self.beacon_failures.get(),
            experiments_loaded: self.experiments_loaded.get(),
            experiment_load_failures: self.experiment_load_failures.get(),
            exposures: self.exposures.get(),
            conversions: self.conversions.get(),
            assignment_persist_failures: self.assignment_persist_failures.get(),
            delivery_latency_mean_ms: self.delivery_latency_ms.mean(),
            inflight_deliveries: self.inflight_deliveries.get(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_tracked: u64,
    pub events_delivered: u64,
    pub events_deduplicated: u64,
    pub delivery_failures: u64,
    pub beacons_sent: u64,
    pub beacon_failures: u64,
    pub experiments_loaded: u64,
    pub experiment_load_failures: u64,
    pub exposures: u64,
    pub conversions: u64,
    pub assignment_persist_failures: u64,
    pub delivery_latency_mean_ms: f64,
    pub inflight_deliveries: u64,
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
