//! Reliable event producer over a Kafka-compatible broker.
//!
//! The producer offers a synchronous [`send`](EventProducer::send) that
//! awaits broker acknowledgment and an asynchronous
//! [`send_async`](EventProducer::send_async) whose outcome is surfaced only
//! through logs and counters. Batching is delegated to the client's
//! accumulator: a batch flushes when either `flush_messages` or
//! `flush_frequency` is reached.
//!
//! # Delivery semantics
//!
//! - Partitioning by message key; an absent key lets the broker client pick
//!   a partition (discouraged for ordered streams).
//! - Transient delivery errors (queue full, broker transport, leader not
//!   available) are retried up to `max_retries` with a fixed backoff.
//!   Authorization, message-too-large and configuration errors surface
//!   immediately.
//! - With `idempotent` enabled the client enforces exactly-once ordering per
//!   partition; config validation pins `max_in_flight` to 1.

use crate::config::ProducerConfig;
use crate::error::{BusError, BusResult};
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rocketry_core::{EventEnvelope, Payload};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Where a message landed after successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Partition the message was written to.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
}

/// Event producer with acks, compression, batching and idempotent ordering.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    config: Arc<ProducerConfig>,
    closed: Arc<AtomicBool>,
}

impl EventProducer {
    /// Create a producer from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] on inconsistent settings and
    /// [`BusError::ConnectionFailed`] when the client cannot be created.
    pub fn new(config: ProducerConfig) -> BusResult<Self> {
        config.validate()?;

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.producer_id)
            .set("acks", config.acks.as_config_str())
            .set("compression.type", config.compression.as_config_str())
            .set("enable.idempotence", config.idempotent.to_string())
            .set(
                "max.in.flight.requests.per.connection",
                config.max_in_flight.to_string(),
            )
            .set("message.timeout.ms", config.message_timeout.as_millis().to_string())
            .set("batch.num.messages", config.flush_messages.to_string())
            .set(
                "queue.buffering.max.ms",
                config.flush_frequency.as_millis().to_string(),
            );

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| BusError::ConnectionFailed(format!("failed to create producer: {e}")))?;

        tracing::info!(
            brokers = %config.brokers,
            producer_id = %config.producer_id,
            acks = config.acks.as_config_str(),
            compression = config.compression.as_config_str(),
            idempotent = config.idempotent,
            "event producer created"
        );

        Ok(Self {
            producer,
            config: Arc::new(config),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The producer instance id stamped into headers.
    #[must_use]
    pub fn producer_id(&self) -> &str {
        &self.config.producer_id
    }

    /// Send a message and await broker acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`close`](Self::close), or
    /// [`BusError::PublishFailed`] once transient retries are exhausted or a
    /// non-retryable delivery error occurs.
    pub async fn send(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: Payload,
        headers: Vec<(String, Vec<u8>)>,
    ) -> BusResult<Delivery> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let bytes = payload
            .into_bytes()
            .map_err(|e| BusError::PublishFailed { topic: topic.to_string(), reason: e.to_string() })?;

        let mut attempt: u32 = 0;
        loop {
            match self.try_send(topic, key, &bytes, &headers).await {
                Ok(delivery) => {
                    metrics::counter!("bus_producer_messages_total", "result" => "ok").increment(1);
                    tracing::debug!(
                        topic = %topic,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        "message published"
                    );
                    return Ok(delivery);
                }
                Err(kafka_error) => {
                    let transient = is_transient(&kafka_error);
                    if transient && attempt < self.config.max_retries {
                        attempt += 1;
                        tracing::warn!(
                            topic = %topic,
                            attempt,
                            error = %kafka_error,
                            "transient delivery error, retrying"
                        );
                        tokio::time::sleep(self.config.retry_backoff).await;
                        continue;
                    }
                    metrics::counter!("bus_producer_messages_total", "result" => "error")
                        .increment(1);
                    tracing::error!(
                        topic = %topic,
                        attempts = attempt + 1,
                        transient,
                        error = %kafka_error,
                        "failed to publish message"
                    );
                    return Err(BusError::PublishFailed {
                        topic: topic.to_string(),
                        reason: kafka_error.to_string(),
                    });
                }
            }
        }
    }

    /// Send a message without awaiting the outcome.
    ///
    /// The delivery future runs on a background task; success and failure
    /// are logged and counted, with no per-call completion.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] after [`close`](Self::close) and
    /// [`BusError::PublishFailed`] if the payload cannot be encoded.
    pub fn send_async(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: Payload,
        headers: Vec<(String, Vec<u8>)>,
    ) -> BusResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        let bytes = payload
            .into_bytes()
            .map_err(|e| BusError::PublishFailed { topic: topic.to_string(), reason: e.to_string() })?;

        let this = self.clone();
        let topic = topic.to_string();
        let key = key.map(<[u8]>::to_vec);
        tokio::spawn(async move {
            match this.try_send(&topic, key.as_deref(), &bytes, &headers).await {
                Ok(delivery) => {
                    metrics::counter!("bus_producer_async_total", "result" => "ok").increment(1);
                    tracing::debug!(
                        topic = %topic,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        "async message published"
                    );
                }
                Err(error) => {
                    metrics::counter!("bus_producer_async_total", "result" => "error").increment(1);
                    tracing::error!(topic = %topic, error = %error, "async publish failed");
                }
            }
        });
        Ok(())
    }

    /// Publish an [`EventEnvelope`], keyed by its subject.
    ///
    /// The topic is the envelope's event type; headers carry the full
    /// required set including `producer-id` and a fresh `message-id`.
    ///
    /// # Errors
    ///
    /// Propagates [`send`](Self::send) errors, plus
    /// [`BusError::PublishFailed`] if the envelope cannot be serialized.
    pub async fn send_event(&self, envelope: &EventEnvelope) -> BusResult<Delivery> {
        let topic = envelope.event_type.topic();
        let bytes = envelope.to_bytes().map_err(|e| BusError::PublishFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        let headers = envelope.publish_headers(&self.config.producer_id);
        self.send(topic, Some(envelope.subject.as_bytes()), Payload::Bytes(bytes), headers)
            .await
    }

    async fn try_send(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        bytes: &[u8],
        headers: &[(String, Vec<u8>)],
    ) -> Result<Delivery, KafkaError> {
        let mut owned_headers = OwnedHeaders::new_with_capacity(headers.len());
        for (header_key, header_value) in headers {
            owned_headers = owned_headers.insert(Header {
                key: header_key.as_str(),
                value: Some(header_value),
            });
        }

        let mut record: FutureRecord<'_, [u8], [u8]> =
            FutureRecord::to(topic).payload(bytes).headers(owned_headers);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, Timeout::After(self.config.message_timeout))
            .await
            .map(|(partition, offset)| Delivery { partition, offset })
            .map_err(|(kafka_error, _message)| kafka_error)
    }

    /// Resolve the broker list and confirm at least one broker is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ConnectionFailed`] when metadata cannot be read or
    /// no broker responds.
    pub fn health_check(&self) -> BusResult<()> {
        let metadata = self
            .producer
            .client()
            .fetch_metadata(None, Timeout::After(Duration::from_secs(5)))
            .map_err(|e| BusError::ConnectionFailed(format!("metadata fetch failed: {e}")))?;

        if metadata.brokers().is_empty() {
            return Err(BusError::ConnectionFailed("no reachable brokers".into()));
        }
        if let Some(topic) = metadata.topics().first() {
            tracing::debug!(
                topic = topic.name(),
                partitions = topic.partitions().len(),
                brokers = metadata.brokers().len(),
                "producer health check passed"
            );
        }
        Ok(())
    }

    /// Flush pending batches, then release network resources. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.producer.flush(Timeout::After(Duration::from_secs(10))) {
            tracing::warn!(error = %e, "flush on close failed; unsent batches may be lost");
        }
        tracing::info!(producer_id = %self.config.producer_id, "event producer closed");
    }
}

#[async_trait::async_trait]
impl rocketry_core::EventPublisher for EventProducer {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), rocketry_core::FabricError> {
        self.send_event(envelope).await.map(|_| ()).map_err(Into::into)
    }
}

/// Whether a delivery error is worth retrying.
///
/// Network and leadership hiccups are transient; authorization, size and
/// configuration problems are not.
fn is_transient(error: &KafkaError) -> bool {
    match error {
        KafkaError::MessageProduction(code) => matches!(
            code,
            RDKafkaErrorCode::QueueFull
                | RDKafkaErrorCode::MessageTimedOut
                | RDKafkaErrorCode::BrokerTransportFailure
                | RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::LeaderNotAvailable
                | RDKafkaErrorCode::NotLeaderForPartition
                | RDKafkaErrorCode::RequestTimedOut
                | RDKafkaErrorCode::NetworkException
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::{Acks, Compression};
    use rocketry_core::{EventType, events::PaymentProcessedData, events::PaymentStatus};
    use uuid::Uuid;

    #[test]
    fn event_producer_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<EventProducer>();
        assert_sync::<EventProducer>();
    }

    #[test]
    fn transient_classification() {
        assert!(is_transient(&KafkaError::MessageProduction(
            RDKafkaErrorCode::QueueFull
        )));
        assert!(is_transient(&KafkaError::MessageProduction(
            RDKafkaErrorCode::LeaderNotAvailable
        )));
        assert!(!is_transient(&KafkaError::MessageProduction(
            RDKafkaErrorCode::MessageSizeTooLarge
        )));
        assert!(!is_transient(&KafkaError::MessageProduction(
            RDKafkaErrorCode::TopicAuthorizationFailed
        )));
    }

    #[test]
    fn producer_can_be_constructed_without_broker() {
        // Client creation is lazy; no broker connection happens here.
        let config = ProducerConfig::builder("localhost:9092", "test-producer")
            .acks(Acks::All)
            .compression(Compression::Lz4)
            .idempotent(true)
            .build()
            .unwrap();
        let producer = EventProducer::new(config).unwrap();
        assert_eq!(producer.producer_id(), "test-producer");
    }

    #[test]
    fn close_is_idempotent() {
        let config = ProducerConfig::builder("localhost:9092", "p1").build().unwrap();
        let producer = EventProducer::new(config).unwrap();
        producer.close();
        producer.close();
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let config = ProducerConfig::builder("localhost:9092", "p1").build().unwrap();
        let producer = EventProducer::new(config).unwrap();
        producer.close();

        let payment = PaymentProcessedData {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: PaymentStatus::Completed,
            amount: 500.0,
            currency: "USD".to_string(),
            transaction_id: None,
        };
        let envelope = EventEnvelope::new(
            EventType::PaymentProcessed,
            "order-service",
            payment.order_id.to_string(),
            &payment,
        )
        .unwrap();

        assert!(matches!(
            producer.send_event(&envelope).await,
            Err(BusError::Closed)
        ));
    }
}
