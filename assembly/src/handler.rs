//! Bus handler consuming `payment.processed`.

use crate::saga::AssemblyEngine;
use async_trait::async_trait;
use rocketry_bus::EventHandler;
use rocketry_core::events::{PaymentProcessedData, PaymentStatus};
use rocketry_core::{EventEnvelope, EventType, FabricError};
use std::sync::Arc;
use tracing::debug;

/// Feeds settled payments into the assembly engine.
///
/// Non-completed payment statuses are a no-op success; envelopes missing
/// `order_id` or `user_id` fail validation and are never retried.
pub struct PaymentProcessedHandler {
    engine: Arc<AssemblyEngine>,
}

impl PaymentProcessedHandler {
    /// Wrap an engine.
    #[must_use]
    pub const fn new(engine: Arc<AssemblyEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EventHandler for PaymentProcessedHandler {
    fn supported_topics(&self) -> Vec<String> {
        vec![EventType::PaymentProcessed.topic().to_string()]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), FabricError> {
        let payment: PaymentProcessedData = envelope.payload().map_err(FabricError::from)?;

        if payment.status != PaymentStatus::Completed {
            debug!(
                order_id = %payment.order_id,
                status = ?payment.status,
                "ignoring non-completed payment"
            );
            return Ok(());
        }

        self.engine
            .submit(payment.order_id, payment.user_id)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::saga::AssemblyConfig;
    use rocketry_core::SystemClock;
    use rocketry_testing::InMemoryEventBus;
    use std::time::Duration;
    use uuid::Uuid;

    fn engine(bus: Arc<InMemoryEventBus>) -> Arc<AssemblyEngine> {
        AssemblyEngine::new(
            AssemblyConfig::default()
                .with_simulation_duration(Duration::from_millis(10))
                .with_failure_rate(0.0),
            bus,
            Arc::new(SystemClock),
        )
    }

    fn payment_envelope(status: &str) -> EventEnvelope {
        EventEnvelope::new(
            EventType::PaymentProcessed,
            "order-service",
            Uuid::new_v4().to_string(),
            &serde_json::json!({
                "order_id": Uuid::new_v4(),
                "user_id": Uuid::new_v4(),
                "status": status,
                "amount": 500.0,
                "currency": "USD",
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn completed_payment_allocates_an_assembly() {
        let bus = Arc::new(InMemoryEventBus::new());
        let engine = engine(Arc::clone(&bus));
        let handler = PaymentProcessedHandler::new(Arc::clone(&engine));

        handler.handle(&payment_envelope("completed")).await.unwrap();
        assert_eq!(engine.active_count().await, 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn non_completed_payment_is_a_no_op_success() {
        let bus = Arc::new(InMemoryEventBus::new());
        let engine = engine(Arc::clone(&bus));
        let handler = PaymentProcessedHandler::new(Arc::clone(&engine));

        handler.handle(&payment_envelope("pending")).await.unwrap();
        handler.handle(&payment_envelope("failed")).await.unwrap();
        assert_eq!(engine.active_count().await, 0);
    }

    #[tokio::test]
    async fn missing_required_fields_fail_validation() {
        let bus = Arc::new(InMemoryEventBus::new());
        let engine = engine(bus);
        let handler = PaymentProcessedHandler::new(engine);

        let envelope = EventEnvelope::new(
            EventType::PaymentProcessed,
            "order-service",
            "o1",
            &serde_json::json!({"status": "completed"}),
        )
        .unwrap();

        let err = handler.handle(&envelope).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
