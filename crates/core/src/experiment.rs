//! Experiment, variant, and assignment types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use crate::error::{Error, Result};

/// Experiment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
    Archived,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

/// One arm of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub experiment_id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub is_control: bool,
    /// Relative weight; zero-weight variants never receive traffic
    #[validate(range(min = 0.0))]
    pub traffic_weight: f64,
    /// Opaque configuration handed to UI code
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

/// An A/B test definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ExperimentStatus,
    /// Share of page views entered into the experiment (0-100)
    #[serde(alias = "trafficAllocation")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub traffic_allocation_percent: f64,
    /// Page paths the experiment runs on; empty means everywhere
    #[serde(default)]
    pub target_pages: Vec<String>,
    #[serde(default)]
    #[validate(length(min = 1))]
    #[validate(nested)]
    pub variants: Vec<Variant>,
}

impl Experiment {
    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }

    /// Whether the experiment runs on the given path.
    ///
    /// A target matches the path itself and everything below it.
    pub fn targets_path(&self, path: &str) -> bool {
        self.target_pages.is_empty()
            || self
                .target_pages
                .iter()
                .any(|target| path == target || path.starts_with(target.as_str()))
    }

    /// Variants that can receive traffic, in their defined order.
    pub fn eligible_variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(|v| v.traffic_weight > 0.0)
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Checks the configuration is usable for bucketing.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::invalid_experiment(&self.name, e.to_string()))?;

        if let Some(stray) = self.variants.iter().find(|v| v.experiment_id != self.id) {
            return Err(Error::invalid_experiment(
                &self.name,
                format!("variant {} belongs to experiment {}", stray.id, stray.experiment_id),
            ));
        }
        Ok(())
    }
}

/// A visitor's membership in one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub experiment_id: String,
    pub variant_id: String,
    pub session_id: String,
    pub fingerprint: String,
    pub user_id: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub first_exposure_at: Option<DateTime<Utc>>,
    pub last_exposure_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exposure_count: u32,
}

impl Assignment {
    /// Creates an assignment that has been exposed once.
    pub fn new(
        experiment_id: impl Into<String>,
        variant_id: impl Into<String>,
        session_id: impl Into<String>,
        fingerprint: impl Into<String>,
        user_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            variant_id: variant_id.into(),
            session_id: session_id.into(),
            fingerprint: fingerprint.into(),
            user_id,
            assigned_at: now,
            first_exposure_at: Some(now),
            last_exposure_at: Some(now),
            exposure_count: 1,
        }
    }

    /// Bumps exposure bookkeeping.
    pub fn record_exposure(&mut self, now: DateTime<Utc>) {
        self.first_exposure_at.get_or_insert(now);
        self.last_exposure_at = Some(now);
        self.exposure_count = self.exposure_count.saturating_add(1);
    }
}
