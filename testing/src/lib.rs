//! # Rocketry Testing
//!
//! Testing utilities and helpers for the Rocketry fabric.
//!
//! This crate provides:
//! - Mock implementations of ambient capabilities ([`mocks::FixedClock`])
//! - An in-memory event bus preserving per-subject ordering
//!   ([`mocks::InMemoryEventBus`])
//!
//! ## Example
//!
//! ```
//! use rocketry_testing::mocks::InMemoryEventBus;
//! use rocketry_core::{EventEnvelope, EventPublisher, EventType};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(InMemoryEventBus::new());
//! let envelope = EventEnvelope::new(
//!     EventType::OrderCreated,
//!     "order-service",
//!     "order-1",
//!     &serde_json::json!({}),
//! )?;
//! bus.publish(&envelope).await?;
//! assert_eq!(bus.published("order.created").await.len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Mock implementations for testing.
pub mod mocks {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rocketry_core::{Clock, EventEnvelope, EventPublisher, FabricError};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{Mutex, mpsc};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time until advanced, making tests
    /// reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use rocketry_testing::mocks::FixedClock;
    /// use rocketry_core::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<std::sync::Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a fixed clock at the given time.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self { time: Arc::new(std::sync::Mutex::new(time)) }
        }

        /// Advance the clock by `duration`.
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned, which cannot happen in
        /// practice.
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, duration: chrono::Duration) {
            let mut time = self.time.lock().unwrap();
            *time += duration;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// In-memory event bus for tests.
    ///
    /// Records every published envelope per topic (publication order, which
    /// preserves per-subject ordering) and fans out to live subscribers.
    #[derive(Default)]
    pub struct InMemoryEventBus {
        published: Mutex<HashMap<String, Vec<EventEnvelope>>>,
        subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<EventEnvelope>>>>,
        fail_publishes: std::sync::atomic::AtomicBool,
    }

    impl InMemoryEventBus {
        /// Create an empty bus.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent publishes fail with a transient error.
        pub fn fail_publishes(&self, fail: bool) {
            self.fail_publishes
                .store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        /// Subscribe to a topic; returns a receiver of future publishes.
        pub async fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<EventEnvelope> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.subscribers
                .lock()
                .await
                .entry(topic.to_string())
                .or_default()
                .push(tx);
            rx
        }

        /// Everything published to `topic`, in publication order.
        pub async fn published(&self, topic: &str) -> Vec<EventEnvelope> {
            self.published
                .lock()
                .await
                .get(topic)
                .cloned()
                .unwrap_or_default()
        }

        /// Total number of envelopes published across all topics.
        pub async fn total_published(&self) -> usize {
            self.published.lock().await.values().map(Vec::len).sum()
        }
    }

    #[async_trait]
    impl EventPublisher for InMemoryEventBus {
        async fn publish(&self, envelope: &EventEnvelope) -> Result<(), FabricError> {
            if self.fail_publishes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(FabricError::Transient("in-memory bus set to fail".into()));
            }
            let topic = envelope.event_type.topic().to_string();
            self.published
                .lock()
                .await
                .entry(topic.clone())
                .or_default()
                .push(envelope.clone());

            let mut subscribers = self.subscribers.lock().await;
            if let Some(senders) = subscribers.get_mut(&topic) {
                senders.retain(|sender| sender.send(envelope.clone()).is_ok());
            }
            Ok(())
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryEventBus, test_clock};

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rocketry_core::{EventEnvelope, EventPublisher, EventType};

    #[test]
    fn fixed_clock_is_deterministic_until_advanced() {
        use rocketry_core::Clock;

        let clock = test_clock();
        let before = clock.now();
        assert_eq!(before, clock.now());

        clock.advance(chrono::Duration::minutes(30));
        assert_eq!(clock.now() - before, chrono::Duration::minutes(30));
    }

    #[tokio::test]
    async fn in_memory_bus_preserves_publication_order() {
        let bus = InMemoryEventBus::new();
        for i in 0..5 {
            let envelope = EventEnvelope::new(
                EventType::OrderStatusChanged,
                "order-service",
                "order-1",
                &serde_json::json!({"seq": i}),
            )
            .unwrap();
            bus.publish(&envelope).await.unwrap();
        }

        let published = bus.published("order.status.changed").await;
        assert_eq!(published.len(), 5);
        for (i, envelope) in published.iter().enumerate() {
            assert_eq!(envelope.data["seq"], i);
        }
    }

    #[tokio::test]
    async fn subscribers_receive_fanout() {
        let bus = InMemoryEventBus::new();
        let mut rx = bus.subscribe("order.created").await;

        let envelope = EventEnvelope::new(
            EventType::OrderCreated,
            "order-service",
            "order-1",
            &serde_json::json!({}),
        )
        .unwrap();
        bus.publish(&envelope).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, envelope.id);
    }

    #[tokio::test]
    async fn failure_mode_returns_transient() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes(true);
        let envelope = EventEnvelope::new(
            EventType::OrderCreated,
            "order-service",
            "order-1",
            &serde_json::json!({}),
        )
        .unwrap();
        let err = bus.publish(&envelope).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
