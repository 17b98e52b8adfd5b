//! Client configuration.

use delivery::DeliveryConfig;
use engine_core::{PageSnapshot, SESSION_TIMEOUT_MINUTES};
use experiments::ExperimentBackendConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Experiment client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL for events, experiments and assignments
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_events_path")]
    pub events_path: String,
    #[serde(default = "default_experiments_path")]
    pub experiments_path: String,
    #[serde(default = "default_assignments_path")]
    pub assignments_path: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Width of the dedup timestamp bucket in milliseconds
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Session inactivity timeout
    #[serde(default = "default_session_timeout_minutes")]
    pub session_timeout_minutes: i64,
    /// Keeps session state in this file instead of memory
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    /// Logged-in user, if known
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub page: PageConfig,
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_events_path() -> String {
    "/api/analytics/events".to_string()
}

fn default_experiments_path() -> String {
    "/api/experiments".to_string()
}

fn default_assignments_path() -> String {
    "/api/experiments/assignments".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_dedup_window_ms() -> u64 {
    1000
}

fn default_session_timeout_minutes() -> i64 {
    SESSION_TIMEOUT_MINUTES
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            events_path: default_events_path(),
            experiments_path: default_experiments_path(),
            assignments_path: default_assignments_path(),
            request_timeout_ms: default_request_timeout_ms(),
            dedup_window_ms: default_dedup_window_ms(),
            session_timeout_minutes: default_session_timeout_minutes(),
            storage_path: None,
            user_id: None,
            page: PageConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            endpoint: self.api_base_url.clone(),
            events_path: self.events_path.clone(),
            request_timeout_ms: self.request_timeout_ms,
            dedup_window_ms: self.dedup_window_ms,
        }
    }

    pub fn backend(&self) -> ExperimentBackendConfig {
        ExperimentBackendConfig {
            endpoint: self.api_base_url.clone(),
            experiments_path: self.experiments_path.clone(),
            assignments_path: self.assignments_path.clone(),
            request_timeout_ms: self.request_timeout_ms,
        }
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_timeout_minutes.max(1))
    }
}

/// The page the client runs on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_page_url")]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

fn default_page_url() -> String {
    "http://localhost/".to_string()
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            url: default_page_url(),
            title: String::new(),
            referrer: None,
            locale: None,
        }
    }
}

impl PageConfig {
    pub fn snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            url: self.url.clone(),
            title: self.title.clone(),
            referrer: self.referrer.clone(),
            locale: self.locale.clone(),
        }
    }
}
