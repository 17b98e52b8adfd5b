//! Dedup keys for in-flight events.

use chrono::{DateTime, Utc};
use engine_core::TrackedEvent;
use std::collections::BTreeMap;

/// Identifies events that count as the same delivery.
///
/// Built from type, category, action, the serialized properties, and the
/// timestamp truncated to a coarse window. Properties are serialized with
/// sorted keys, so equal maps produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(event: &TrackedEvent, at: DateTime<Utc>, window_ms: u64) -> Self {
        let window = window_ms.max(1) as i64;
        let bucket = at.timestamp_millis().div_euclid(window);
        let sorted: BTreeMap<&String, &serde_json::Value> = event.properties.iter().collect();
        let properties = serde_json::to_string(&sorted).unwrap_or_default();

        Self(format!(
            "{}|{}|{}|{}|{}",
            event.event_type,
            event.event_category.as_deref().unwrap_or(""),
            event.event_action.as_deref().unwrap_or(""),
            properties,
            bucket
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
