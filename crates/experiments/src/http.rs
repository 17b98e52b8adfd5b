//! HTTP-backed experiment source and assignment store.

use async_trait::async_trait;
use engine_core::error::TransportErrorCode;
use engine_core::{Assignment, Error, Experiment, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::source::{AssignmentStore, ExperimentSource};

/// Experiment backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentBackendConfig {
    /// Backend base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Path listing experiments
    #[serde(default = "default_experiments_path")]
    pub experiments_path: String,
    /// Path for assignment lookups and writes
    #[serde(default = "default_assignments_path")]
    pub assignments_path: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:3000".to_string()
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

impl Default for ExperimentBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            experiments_path: default_experiments_path(),
            assignments_path: default_assignments_path(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Client for the experiment backend. Serves as both source and store.
#[derive(Clone)]
pub struct HttpExperimentBackend {
    experiments_url: String,
    assignments_url: String,
    http_client: reqwest::Client,
}

impl HttpExperimentBackend {
    pub fn new(config: &ExperimentBackendConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            experiments_url: delivery::join_url(&config.endpoint, &config.experiments_path),
            assignments_url: delivery::join_url(&config.endpoint, &config.assignments_path),
            http_client,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| {
            Error::transport(TransportErrorCode::RequestFailed, e.to_string(), None)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(
                TransportErrorCode::BadStatus,
                format!("experiment backend returned {}", status),
                Some(status.as_u16()),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            Error::transport(TransportErrorCode::RequestFailed, e.to_string(), None)
        })?;
        serde_json::from_slice(&body).map_err(|e| Error::malformed(e.to_string()))
    }
}

/// Accepts a bare array or `{ "experiments": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExperimentsPayload {
    List(Vec<Experiment>),
    Wrapped { experiments: Vec<Experiment> },
}

#[async_trait]
impl ExperimentSource for HttpExperimentBackend {
    async fn running_experiments(&self) -> Result<Vec<Experiment>> {
        let request = self
            .http_client
            .get(&self.experiments_url)
            .query(&[("status", "running")]);

        let experiments = match self.get_json::<ExperimentsPayload>(request).await? {
            ExperimentsPayload::List(list) => list,
            ExperimentsPayload::Wrapped { experiments } => experiments,
        };

        debug!(count = experiments.len(), "Fetched experiments");
        Ok(experiments)
    }
}

#[async_trait]
impl AssignmentStore for HttpExperimentBackend {
    async fn find(&self, experiment_id: &str, fingerprint: &str) -> Result<Option<Assignment>> {
        let request = self
            .http_client
            .get(&self.assignments_url)
            .query(&[("experimentId", experiment_id), ("fingerprint", fingerprint)]);

        self.get_json(request).await
    }

    async fn save(&self, assignment: &Assignment) -> Result<()> {
        let response = self
            .http_client
            .post(&self.assignments_url)
            .json(assignment)
            .send()
            .await
            .map_err(|e| {
                Error::transport(TransportErrorCode::RequestFailed, e.to_string(), None)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(
                TransportErrorCode::BadStatus,
                format!("assignment write returned {}", status),
                Some(status.as_u16()),
            ));
        }
        Ok(())
    }
}
