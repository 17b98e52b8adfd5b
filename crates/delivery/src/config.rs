//! Delivery configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Event delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Backend base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Path events are POSTed to
    #[serde(default = "default_events_path")]
    pub events_path: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Width of the timestamp bucket used in dedup keys, in milliseconds
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:3000".to_string()
}

fn default_events_path() -> String {
    "/api/analytics/events".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_dedup_window_ms() -> u64 {
    1000
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            events_path: default_events_path(),
            request_timeout_ms: default_request_timeout_ms(),
            dedup_window_ms: default_dedup_window_ms(),
        }
    }
}

impl DeliveryConfig {
    /// Full URL events are POSTed to.
    pub fn events_url(&self) -> String {
        join_url(&self.endpoint, &self.events_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Joins a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
