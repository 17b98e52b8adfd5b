//! Logging setup and in-process metrics for the experimentation engine.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;
