//! Dead-letter fan-out for messages that exhausted the retry ladder.

use crate::error::BusResult;
use crate::handler::InboundMessage;
use crate::producer::EventProducer;
use chrono::Utc;
use rocketry_core::{FabricError, Payload};

/// Header naming the topic the message originally arrived on.
pub const HEADER_DLQ_ORIGINAL_TOPIC: &str = "dlq-original-topic";
/// Header carrying the final error message.
pub const HEADER_DLQ_ERROR: &str = "dlq-error";
/// Header carrying the final error kind.
pub const HEADER_DLQ_ERROR_KIND: &str = "dlq-error-kind";
/// Header carrying the number of attempts consumed.
pub const HEADER_DLQ_ATTEMPTS: &str = "dlq-attempts";
/// Header carrying the UTC time the message was dead-lettered.
pub const HEADER_DLQ_FAILED_AT: &str = "dlq-failed-at";

/// Emits exhausted messages to a dead-letter topic.
///
/// The original payload is forwarded untouched; failure metadata travels in
/// headers so DLQ tooling can triage without decoding the body.
pub struct DlqProducer {
    producer: EventProducer,
    topic: String,
}

impl DlqProducer {
    /// Create a dead-letter producer targeting `topic`.
    #[must_use]
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self { producer, topic: topic.into() }
    }

    /// The dead-letter topic name.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Forward `message` with failure metadata.
    ///
    /// The original key is preserved so per-subject ordering holds on the
    /// dead-letter topic too.
    ///
    /// # Errors
    ///
    /// Propagates the underlying publish failure.
    pub async fn send(
        &self,
        message: &InboundMessage,
        error: &FabricError,
        attempts: u32,
    ) -> BusResult<()> {
        let mut headers: Vec<(String, Vec<u8>)> = vec![
            (
                HEADER_DLQ_ORIGINAL_TOPIC.to_string(),
                message.topic.clone().into_bytes(),
            ),
            (HEADER_DLQ_ERROR.to_string(), error.to_string().into_bytes()),
            (
                HEADER_DLQ_ERROR_KIND.to_string(),
                error.kind().as_str().as_bytes().to_vec(),
            ),
            (HEADER_DLQ_ATTEMPTS.to_string(), attempts.to_string().into_bytes()),
            (
                HEADER_DLQ_FAILED_AT.to_string(),
                Utc::now().to_rfc3339().into_bytes(),
            ),
        ];
        if let Some(event_id) = &message.headers.event_id {
            headers.push(("event-id".to_string(), event_id.clone().into_bytes()));
        }
        if let Some(event_type) = &message.headers.event_type {
            headers.push(("event-type".to_string(), event_type.clone().into_bytes()));
        }

        self.producer
            .send(
                &self.topic,
                message.key.as_deref(),
                Payload::Bytes(message.value.clone()),
                headers,
            )
            .await?;

        metrics::counter!("bus_consumer_dead_lettered_total", "topic" => message.topic.clone())
            .increment(1);
        tracing::warn!(
            original_topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            dlq_topic = %self.topic,
            attempts,
            error = %error,
            "message routed to dead-letter topic"
        );
        Ok(())
    }
}
