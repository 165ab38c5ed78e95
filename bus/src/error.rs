//! Error types for event bus operations.

use rocketry_core::FabricError;
use thiserror::Error;

/// Result type alias for bus operations.
pub type BusResult<T> = std::result::Result<T, BusError>;

/// Errors that can occur in the event bus layer.
#[derive(Error, Debug, Clone)]
pub enum BusError {
    /// Failed to connect to the broker or create a client.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to subscribe to topics.
    #[error("subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe.
        topics: Vec<String>,
        /// The reason for failure.
        reason: String,
    },

    /// Envelope bytes could not be decoded.
    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    /// A configuration value is invalid or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A consumer with this name already exists on the coordinator.
    #[error("consumer '{0}' is already registered")]
    DuplicateConsumer(String),

    /// No consumer with this name is registered on the coordinator.
    #[error("no consumer named '{0}'")]
    UnknownConsumer(String),

    /// The coordinator has no producer to delegate sends to.
    #[error("no producer configured")]
    NoProducer,

    /// The component has been closed.
    #[error("closed")]
    Closed,

    /// Graceful shutdown did not complete in time.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

impl BusError {
    /// Whether the producer retry loop may re-attempt this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::PublishFailed { .. }
        )
    }
}

impl From<BusError> for FabricError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::InvalidConfig(msg) => Self::Validation(msg),
            BusError::DeserializationFailed(msg) => Self::Validation(msg),
            BusError::DuplicateConsumer(name) => {
                Self::Conflict(format!("consumer '{name}' already registered"))
            }
            BusError::UnknownConsumer(name) => Self::NotFound(format!("consumer '{name}'")),
            other => Self::Transient(other.to_string()),
        }
    }
}
