//! Collaborators the assignment engine reads from and writes to.

use async_trait::async_trait;
use engine_core::{Assignment, Experiment, Result};
use rand::Rng;

/// Read side: experiments currently running, with their variants.
#[async_trait]
pub trait ExperimentSource: Send + Sync {
    async fn running_experiments(&self) -> Result<Vec<Experiment>>;
}

/// Persistence for assignments, keyed by experiment and fingerprint.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Looks up an existing assignment for a visitor.
    async fn find(&self, experiment_id: &str, fingerprint: &str) -> Result<Option<Assignment>>;

    /// Creates or updates an assignment.
    async fn save(&self, assignment: &Assignment) -> Result<()>;
}

/// Draws for the traffic-allocation gate.
pub trait RandomSource: Send + Sync {
    /// Uniform draw in `[0, 100)`.
    fn percent(&self) -> f64;
}

/// Thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn percent(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..100.0)
    }
}

/// Always draws the same value. Pins allocation for QA and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn percent(&self) -> f64 {
        self.0
    }
}
