//! Public API of the experimentation engine.

pub mod client;
pub mod config;

pub use client::{ClientBuilder, ExperimentClient, PageSignal};
pub use config::{ClientConfig, PageConfig};
