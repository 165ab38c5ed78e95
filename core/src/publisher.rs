//! Publishing capability injected into event-emitting services.
//!
//! Sagas and dispatchers publish through this trait rather than a concrete
//! producer, so tests can substitute the in-memory bus from the testing
//! crate.

use crate::envelope::EventEnvelope;
use crate::error::FabricError;
use async_trait::async_trait;

/// Capability to publish envelopes onto the bus.
///
/// Implementations must preserve per-subject ordering: two envelopes with
/// the same subject published in order by one caller are observed in that
/// order by consumers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one envelope to the topic named by its event type.
    ///
    /// # Errors
    ///
    /// Returns a [`FabricError`] classified by the transport; `Transient`
    /// publish failures may be retried by the caller.
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), FabricError>;
}
