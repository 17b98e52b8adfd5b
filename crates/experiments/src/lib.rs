//! Experiment loading and deterministic variant assignment.

pub mod bucketing;
pub mod engine;
pub mod http;
pub mod source;

pub use bucketing::{assign_variant, bucket_value, select_variant, BUCKETS};
pub use engine::ExperimentEngine;
pub use http::{ExperimentBackendConfig, HttpExperimentBackend};
pub use source::{AssignmentStore, ExperimentSource, FixedRandom, RandomSource, ThreadRandom};
