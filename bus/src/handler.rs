//! Message handler seam and topic→handler registry.

use async_trait::async_trait;
use rocketry_core::envelope::DecodedHeaders;
use rocketry_core::{EventEnvelope, FabricError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A consumer-side message handler.
///
/// Handlers declare the topics they serve at registration time and are
/// invoked once per delivery attempt. They must be idempotent: the bus gives
/// at-least-once delivery and a message is re-delivered after a rebalance if
/// its offset was not yet committed.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Topics this handler serves.
    fn supported_topics(&self) -> Vec<String>;

    /// Process one envelope.
    ///
    /// The returned error's [`kind`](FabricError::kind) drives the retry
    /// ladder: `Transient` is re-attempted, everything else aborts
    /// immediately.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), FabricError>;
}

/// The ingress view of one broker message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Partitioning key, when present.
    pub key: Option<Vec<u8>>,
    /// Opaque message body.
    pub value: Vec<u8>,
    /// Decoded broker headers.
    pub headers: DecodedHeaders,
    /// Broker timestamp in milliseconds, when present.
    pub timestamp_ms: Option<i64>,
}

/// Topic→handler mapping scoped to one consumer.
///
/// Registrations happen during setup; the rwlock exists for the rare runtime
/// re-registration, not for steady-state contention.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every topic it declares.
    ///
    /// A duplicate topic registration replaces the prior mapping.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        for topic in handler.supported_topics() {
            if handlers.insert(topic.clone(), Arc::clone(&handler)).is_some() {
                tracing::warn!(topic = %topic, "replacing existing handler registration");
            }
        }
    }

    /// Look up the handler for a topic.
    pub async fn get(&self, topic: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.read().await.get(topic).cloned()
    }

    /// All currently registered topics.
    pub async fn topics(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        topics: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn supported_topics(&self) -> Vec<String> {
            self.topics.clone()
        }

        async fn handle(&self, _envelope: &EventEnvelope) -> Result<(), FabricError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn registry_maps_all_declared_topics() {
        let registry = HandlerRegistry::new();
        let handler = Arc::new(CountingHandler {
            topics: vec!["assembly.completed".into(), "assembly.failed".into()],
            calls: AtomicUsize::new(0),
        });
        registry.register(handler).await;

        assert!(registry.get("assembly.completed").await.is_some());
        assert!(registry.get("assembly.failed").await.is_some());
        assert!(registry.get("payment.processed").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_replaces_prior_mapping() {
        let registry = HandlerRegistry::new();
        let first = Arc::new(CountingHandler {
            topics: vec!["order.created".into()],
            calls: AtomicUsize::new(0),
        });
        let second = Arc::new(CountingHandler {
            topics: vec!["order.created".into()],
            calls: AtomicUsize::new(0),
        });
        registry.register(Arc::clone(&first) as Arc<dyn EventHandler>).await;
        registry.register(Arc::clone(&second) as Arc<dyn EventHandler>).await;

        let resolved = registry.get("order.created").await.unwrap();
        let envelope = EventEnvelope::new(
            rocketry_core::EventType::OrderCreated,
            "test",
            "o1",
            &serde_json::json!({}),
        )
        .unwrap();
        resolved.handle(&envelope).await.unwrap();
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }
}
