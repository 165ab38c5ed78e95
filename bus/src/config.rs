//! Producer and consumer configuration.
//!
//! Both configs follow the builder pattern and are validated before any
//! broker client is created, so inconsistent settings fail fast instead of
//! surfacing as delivery anomalies at runtime.

use crate::error::BusError;
use std::time::Duration;

/// Producer acknowledgment policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acks {
    /// Fire and forget (`acks=0`).
    None,
    /// Leader acknowledgment only (`acks=1`).
    #[default]
    Leader,
    /// Full ISR acknowledgment (`acks=all`).
    All,
}

impl Acks {
    /// The librdkafka configuration value.
    #[must_use]
    pub const fn as_config_str(self) -> &'static str {
        match self {
            Self::None => "0",
            Self::Leader => "1",
            Self::All => "all",
        }
    }
}

/// Producer compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// Gzip.
    Gzip,
    /// Snappy.
    Snappy,
    /// LZ4.
    Lz4,
    /// Zstandard.
    Zstd,
}

impl Compression {
    /// The librdkafka configuration value.
    #[must_use]
    pub const fn as_config_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Snappy => "snappy",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

/// Where a new consumer group starts reading when no committed offset exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialOffset {
    /// Start from the beginning of the topic.
    Oldest,
    /// Start from the end (only new events).
    #[default]
    Newest,
}

impl InitialOffset {
    /// The librdkafka `auto.offset.reset` value.
    #[must_use]
    pub const fn as_config_str(self) -> &'static str {
        match self {
            Self::Oldest => "earliest",
            Self::Newest => "latest",
        }
    }
}

/// Configuration for [`EventProducer`](crate::producer::EventProducer).
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Comma-separated broker addresses.
    pub brokers: String,
    /// Producer instance id, stamped into the `producer-id` header.
    pub producer_id: String,
    /// Acknowledgment policy. Default: leader.
    pub acks: Acks,
    /// Compression codec. Default: none.
    pub compression: Compression,
    /// Enable idempotent ordering. Requires `max_in_flight = 1`.
    pub idempotent: bool,
    /// Maximum in-flight requests per connection.
    pub max_in_flight: usize,
    /// Retries on transient delivery errors.
    pub max_retries: u32,
    /// Fixed wait between delivery retries.
    pub retry_backoff: Duration,
    /// Flush a batch once this many messages accumulate.
    pub flush_messages: usize,
    /// Flush a batch after this long regardless of size.
    pub flush_frequency: Duration,
    /// Per-message delivery timeout.
    pub message_timeout: Duration,
}

impl ProducerConfig {
    /// Start building a producer config.
    #[must_use]
    pub fn builder(brokers: impl Into<String>, producer_id: impl Into<String>) -> ProducerConfigBuilder {
        ProducerConfigBuilder {
            config: Self {
                brokers: brokers.into(),
                producer_id: producer_id.into(),
                acks: Acks::default(),
                compression: Compression::default(),
                idempotent: false,
                max_in_flight: 5,
                max_retries: 3,
                retry_backoff: Duration::from_millis(250),
                flush_messages: 100,
                flush_frequency: Duration::from_millis(100),
                message_timeout: Duration::from_secs(5),
            },
        }
    }

    /// Validate internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] when brokers are empty or when
    /// idempotent mode is combined with out-of-order batching
    /// (`max_in_flight != 1`).
    pub fn validate(&self) -> Result<(), BusError> {
        if self.brokers.trim().is_empty() {
            return Err(BusError::InvalidConfig("brokers must not be empty".into()));
        }
        if self.producer_id.trim().is_empty() {
            return Err(BusError::InvalidConfig("producer_id must not be empty".into()));
        }
        if self.idempotent && self.max_in_flight != 1 {
            return Err(BusError::InvalidConfig(format!(
                "idempotent mode requires max_in_flight = 1, got {}",
                self.max_in_flight
            )));
        }
        if self.idempotent && self.acks != Acks::All {
            return Err(BusError::InvalidConfig(
                "idempotent mode requires acks = all".into(),
            ));
        }
        if self.flush_messages == 0 {
            return Err(BusError::InvalidConfig("flush_messages must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for [`ProducerConfig`].
#[derive(Debug, Clone)]
pub struct ProducerConfigBuilder {
    config: ProducerConfig,
}

impl ProducerConfigBuilder {
    /// Set the acknowledgment policy.
    #[must_use]
    pub const fn acks(mut self, acks: Acks) -> Self {
        self.config.acks = acks;
        self
    }

    /// Set the compression codec.
    #[must_use]
    pub const fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Enable idempotent ordering. Forces `max_in_flight` to 1 and
    /// `acks` to all, which the broker client requires for idempotence.
    #[must_use]
    pub const fn idempotent(mut self, enabled: bool) -> Self {
        self.config.idempotent = enabled;
        if enabled {
            self.config.max_in_flight = 1;
            self.config.acks = Acks::All;
        }
        self
    }

    /// Set the maximum in-flight requests per connection.
    #[must_use]
    pub const fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.config.max_in_flight = max_in_flight;
        self
    }

    /// Set the number of delivery retries for transient errors.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Set the fixed backoff between delivery retries.
    #[must_use]
    pub const fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Set batching thresholds: flush when either is reached.
    #[must_use]
    pub const fn batching(mut self, flush_messages: usize, flush_frequency: Duration) -> Self {
        self.config.flush_messages = flush_messages;
        self.config.flush_frequency = flush_frequency;
        self
    }

    /// Set the per-message delivery timeout.
    #[must_use]
    pub const fn message_timeout(mut self, timeout: Duration) -> Self {
        self.config.message_timeout = timeout;
        self
    }

    /// Finish building.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] when validation fails.
    pub fn build(self) -> Result<ProducerConfig, BusError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for [`ConsumerGroup`](crate::consumer::ConsumerGroup).
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Comma-separated broker addresses.
    pub brokers: String,
    /// Consumer group id shared by cooperating members.
    pub group_id: String,
    /// Topics to subscribe to.
    pub topics: Vec<String>,
    /// Concurrent handler slots per member.
    pub concurrency_level: usize,
    /// Retry ladder depth for transient handler failures.
    pub retry_attempts: u32,
    /// Fixed wait between ladder attempts.
    pub retry_backoff: Duration,
    /// Per-message handler deadline.
    pub max_processing_time: Duration,
    /// Dead-letter topic for messages that exhaust the ladder.
    pub dead_letter_topic: Option<String>,
    /// How often marked offsets are committed.
    pub auto_commit_interval: Duration,
    /// Group session timeout.
    pub session_timeout: Duration,
    /// Where new groups start reading. Default: newest.
    pub initial_offset: InitialOffset,
    /// How long graceful stop waits for in-flight handlers.
    pub shutdown_timeout: Duration,
}

impl ConsumerConfig {
    /// Start building a consumer config.
    #[must_use]
    pub fn builder(
        brokers: impl Into<String>,
        group_id: impl Into<String>,
        topics: Vec<String>,
    ) -> ConsumerConfigBuilder {
        ConsumerConfigBuilder {
            config: Self {
                brokers: brokers.into(),
                group_id: group_id.into(),
                topics,
                concurrency_level: 1,
                retry_attempts: 3,
                retry_backoff: Duration::from_millis(500),
                max_processing_time: Duration::from_secs(30),
                dead_letter_topic: None,
                auto_commit_interval: Duration::from_secs(5),
                session_timeout: Duration::from_secs(10),
                initial_offset: InitialOffset::default(),
                shutdown_timeout: Duration::from_secs(30),
            },
        }
    }

    /// Validate internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] on empty brokers/group/topics or a
    /// zero concurrency level.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.brokers.trim().is_empty() {
            return Err(BusError::InvalidConfig("brokers must not be empty".into()));
        }
        if self.group_id.trim().is_empty() {
            return Err(BusError::InvalidConfig("group_id must not be empty".into()));
        }
        if self.topics.is_empty() {
            return Err(BusError::InvalidConfig("topics must not be empty".into()));
        }
        if self.concurrency_level == 0 {
            return Err(BusError::InvalidConfig("concurrency_level must be > 0".into()));
        }
        Ok(())
    }
}

/// Builder for [`ConsumerConfig`].
#[derive(Debug, Clone)]
pub struct ConsumerConfigBuilder {
    config: ConsumerConfig,
}

impl ConsumerConfigBuilder {
    /// Set the number of concurrent handler slots.
    #[must_use]
    pub const fn concurrency_level(mut self, level: usize) -> Self {
        self.config.concurrency_level = level;
        self
    }

    /// Set the retry ladder depth and backoff.
    #[must_use]
    pub const fn retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.config.retry_attempts = attempts;
        self.config.retry_backoff = backoff;
        self
    }

    /// Set the per-message handler deadline.
    #[must_use]
    pub const fn max_processing_time(mut self, deadline: Duration) -> Self {
        self.config.max_processing_time = deadline;
        self
    }

    /// Route exhausted messages to a dead-letter topic.
    #[must_use]
    pub fn dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.dead_letter_topic = Some(topic.into());
        self
    }

    /// Set the offset auto-commit interval.
    #[must_use]
    pub const fn auto_commit_interval(mut self, interval: Duration) -> Self {
        self.config.auto_commit_interval = interval;
        self
    }

    /// Set the group session timeout.
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    /// Set where new groups start reading.
    #[must_use]
    pub const fn initial_offset(mut self, offset: InitialOffset) -> Self {
        self.config.initial_offset = offset;
        self
    }

    /// Set how long graceful stop waits for in-flight handlers.
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Finish building.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] when validation fails.
    pub fn build(self) -> Result<ConsumerConfig, BusError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn producer_defaults_are_leader_acks_no_compression() {
        let config = ProducerConfig::builder("localhost:9092", "test-producer")
            .build()
            .unwrap();
        assert_eq!(config.acks, Acks::Leader);
        assert_eq!(config.compression, Compression::None);
        assert!(!config.idempotent);
    }

    #[test]
    fn idempotent_forces_single_in_flight() {
        let config = ProducerConfig::builder("localhost:9092", "p1")
            .max_in_flight(5)
            .idempotent(true)
            .build()
            .unwrap();
        assert_eq!(config.max_in_flight, 1);
    }

    #[test]
    fn idempotent_with_pipelining_is_rejected() {
        let config = ProducerConfig::builder("localhost:9092", "p1")
            .idempotent(true)
            .max_in_flight(5);
        assert!(matches!(config.build(), Err(BusError::InvalidConfig(_))));
    }

    #[test]
    fn empty_brokers_rejected() {
        assert!(ProducerConfig::builder("  ", "p1").build().is_err());
    }

    #[test]
    fn consumer_defaults() {
        let config = ConsumerConfig::builder(
            "localhost:9092",
            "assembly-service",
            vec!["payment.processed".to_string()],
        )
        .build()
        .unwrap();
        assert_eq!(config.concurrency_level, 1);
        assert_eq!(config.initial_offset, InitialOffset::Newest);
        assert!(config.dead_letter_topic.is_none());
    }

    #[test]
    fn consumer_rejects_zero_concurrency_and_empty_topics() {
        assert!(
            ConsumerConfig::builder("localhost:9092", "g", vec!["t".into()])
                .concurrency_level(0)
                .build()
                .is_err()
        );
        assert!(ConsumerConfig::builder("localhost:9092", "g", vec![]).build().is_err());
    }

    #[test]
    fn config_string_encodings() {
        assert_eq!(Acks::None.as_config_str(), "0");
        assert_eq!(Acks::Leader.as_config_str(), "1");
        assert_eq!(Acks::All.as_config_str(), "all");
        assert_eq!(Compression::Zstd.as_config_str(), "zstd");
        assert_eq!(InitialOffset::Oldest.as_config_str(), "earliest");
        assert_eq!(InitialOffset::Newest.as_config_str(), "latest");
    }
}
