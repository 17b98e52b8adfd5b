//! Event type definitions for the experimentation engine.
//!
//! A [`TrackedEvent`] is what callers emit. The delivery pipeline stamps it
//! with identity, device, page, and location context, producing the
//! [`EnrichedEvent`] that goes over the wire. Both are immutable once built.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::device::{DeviceInfo, LocationInfo};
use crate::page::PageSnapshot;

/// Built-in event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    Scroll,
    PageHidden,
    PageVisible,
    PageExit,
    Exposure,
    Conversion,
    ExperimentEvent,
}

impl EventType {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::Scroll => "scroll",
            Self::PageHidden => "page_hidden",
            Self::PageVisible => "page_visible",
            Self::PageExit => "page_exit",
            Self::Exposure => "exposure",
            Self::Conversion => "conversion",
            Self::ExperimentEvent => "experiment_event",
        }
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

/// An event as emitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
    pub event_type: String,
    pub event_category: Option<String>,
    pub event_action: Option<String>,
    pub event_label: Option<String>,
    pub event_value: Option<f64>,
    /// Custom dimensions and metrics
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl TrackedEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            event_category: None,
            event_action: None,
            event_label: None,
            event_value: None,
            properties: Map::new(),
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.event_category = Some(category.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.event_action = Some(action.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.event_label = Some(label.into());
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.event_value = Some(value);
        self
    }

    /// Adds a custom dimension or metric.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Merges caller-supplied properties. Existing keys are kept.
    pub fn merge_properties(mut self, extra: Map<String, Value>) -> Self {
        for (key, value) in extra {
            self.properties.entry(key).or_insert(value);
        }
        self
    }
}

/// Context stamped onto an event before delivery.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub session_id: String,
    pub fingerprint: String,
    pub user_id: Option<String>,
    pub page: PageSnapshot,
    pub device: DeviceInfo,
    pub location: LocationInfo,
}

/// Event as sent to the delivery sink (camelCase JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEvent {
    pub id: Uuid,
    pub event_type: String,
    pub event_category: Option<String>,
    pub event_action: Option<String>,
    pub event_label: Option<String>,
    pub event_value: Option<f64>,
    pub page_url: String,
    pub page_path: String,
    pub page_title: String,
    pub referrer: String,
    pub session_id: String,
    pub fingerprint: String,
    pub user_id: Option<String>,
    pub locale: String,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub hour_of_day: u32,
    /// 0 = Sunday
    pub day_of_week: u32,
    pub device: DeviceInfo,
    pub country: String,
    pub region: Option<String>,
    pub city: Option<String>,
    pub properties: Map<String, Value>,
}

impl EnrichedEvent {
    pub fn new(event: TrackedEvent, ctx: EventContext, at: DateTime<Utc>) -> Self {
        let page_path = ctx.page.path();
        let locale = ctx
            .page
            .locale
            .clone()
            .unwrap_or_else(|| ctx.device.language.clone());

        Self {
            id: Uuid::new_v4(),
            event_type: event.event_type,
            event_category: event.event_category,
            event_action: event.event_action,
            event_label: event.event_label,
            event_value: event.event_value,
            page_url: ctx.page.url,
            page_path,
            page_title: ctx.page.title,
            referrer: ctx.page.referrer.unwrap_or_default(),
            session_id: ctx.session_id,
            fingerprint: ctx.fingerprint,
            user_id: ctx.user_id,
            locale,
            timestamp: at.timestamp_millis(),
            hour_of_day: at.hour(),
            day_of_week: at.weekday().num_days_from_sunday(),
            device: ctx.device,
            country: ctx.location.country.unwrap_or_else(|| "unknown".into()),
            region: ctx.location.region,
            city: ctx.location.city,
            properties: event.properties,
        }
    }
}
