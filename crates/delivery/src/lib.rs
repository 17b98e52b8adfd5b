//! Event delivery for the experimentation engine.
//!
//! Enriches tracked events with identity, device, page, and location
//! context, collapses concurrent identical deliveries, and offers a
//! send-and-forget path for page teardown.

pub mod config;
pub mod dedup;
pub mod http;
pub mod pipeline;
pub mod sink;

pub use config::*;
pub use dedup::DedupKey;
pub use http::HttpSink;
pub use pipeline::*;
pub use sink::EventSink;
