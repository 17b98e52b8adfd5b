//! Delivery sink abstraction.

use async_trait::async_trait;
use engine_core::{EnrichedEvent, Result};

/// Where enriched events end up.
///
/// The backend must tolerate at-least-once delivery. Client-side dedup only
/// collapses concurrent identical calls.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event and waits for the outcome.
    async fn deliver(&self, event: &EnrichedEvent) -> Result<()>;

    /// Hands an event to a send-and-forget transport.
    ///
    /// Called during page teardown. Must return without waiting on the
    /// network; an `Ok` only means the send was started.
    fn beacon(&self, event: &EnrichedEvent) -> Result<()>;
}
