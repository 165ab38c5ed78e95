//! Per-event message templates.

use rocketry_core::events::{
    AssemblyCompletedData, AssemblyFailedData, AssemblyStartedData, OrderCreatedData,
    OrderStatusChangedData, PaymentProcessedData, PaymentStatus,
};
use rocketry_core::{EventEnvelope, EventType, FabricError};

/// Outcome of template selection for one envelope.
pub enum Rendered {
    /// Deliver this text.
    Message(String),
    /// Drop the envelope silently (e.g. a non-completed payment).
    Skip,
}

/// A short order reference for message text.
fn short_order(order_id: &uuid::Uuid) -> String {
    order_id.to_string().chars().take(8).collect()
}

/// Select and render the template for an envelope.
///
/// # Errors
///
/// Returns `Validation` when the payload does not decode for its declared
/// type; such envelopes are never retried.
pub fn render(envelope: &EventEnvelope) -> Result<Rendered, FabricError> {
    let message = match envelope.event_type {
        EventType::OrderCreated => {
            let data: OrderCreatedData = envelope.payload()?;
            format!(
                "Order {} received: {} item(s), {:.2} {}.",
                short_order(&data.order_id),
                data.item_count,
                data.total,
                data.currency
            )
        }
        EventType::OrderPaid | EventType::OrderCancelled | EventType::OrderStatusChanged => {
            let data: OrderStatusChangedData = envelope.payload()?;
            format!(
                "Order {} is now {}.",
                short_order(&data.order_id),
                data.new_status
            )
        }
        EventType::PaymentProcessed => {
            let data: PaymentProcessedData = envelope.payload()?;
            if data.status != PaymentStatus::Completed {
                return Ok(Rendered::Skip);
            }
            format!(
                "Payment of {:.2} {} received for order {}.",
                data.amount,
                data.currency,
                short_order(&data.order_id)
            )
        }
        EventType::PaymentFailed => {
            let data: PaymentProcessedData = envelope.payload()?;
            format!(
                "Payment for order {} failed. Please try again.",
                short_order(&data.order_id)
            )
        }
        EventType::AssemblyStarted => {
            let data: AssemblyStartedData = envelope.payload()?;
            format!(
                "Assembly of order {} has started ({} components, ~{}s).",
                short_order(&data.order_id),
                data.component_count,
                data.estimated_duration_seconds
            )
        }
        EventType::AssemblyCompleted => {
            let data: AssemblyCompletedData = envelope.payload()?;
            format!(
                "Your rocket for order {} is assembled. Quality: {:?}. Build time: {}s.",
                short_order(&data.order_id),
                data.quality,
                data.actual_duration_seconds
            )
        }
        EventType::AssemblyFailed => {
            let data: AssemblyFailedData = envelope.payload()?;
            format!(
                "Assembly of order {} failed: {} ({}).",
                short_order(&data.order_id),
                data.reason,
                data.error_code
            )
        }
    };
    Ok(Rendered::Message(message))
}

/// Extract the mandatory `user_id` field from any envelope payload.
///
/// # Errors
///
/// Returns `Validation` when the field is missing or malformed.
pub fn recipient_user_id(envelope: &EventEnvelope) -> Result<uuid::Uuid, FabricError> {
    envelope
        .data
        .get("user_id")
        .and_then(serde_json::Value::as_str)
        .and_then(|value| uuid::Uuid::parse_str(value).ok())
        .ok_or_else(|| {
            FabricError::Validation(format!(
                "envelope {} has no usable user_id",
                envelope.id
            ))
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use uuid::Uuid;

    #[test]
    fn non_completed_payments_are_skipped() {
        let envelope = EventEnvelope::new(
            EventType::PaymentProcessed,
            "order-service",
            "o1",
            &serde_json::json!({
                "order_id": Uuid::new_v4(),
                "user_id": Uuid::new_v4(),
                "status": "pending",
                "amount": 10.0,
                "currency": "USD",
            }),
        )
        .unwrap();
        assert!(matches!(render(&envelope).unwrap(), Rendered::Skip));
    }

    #[test]
    fn completed_assembly_renders_quality() {
        let envelope = EventEnvelope::new(
            EventType::AssemblyCompleted,
            "assembly-service",
            "o1",
            &serde_json::json!({
                "assembly_id": Uuid::new_v4(),
                "order_id": Uuid::new_v4(),
                "user_id": Uuid::new_v4(),
                "quality": "premium",
                "actual_duration_seconds": 42,
            }),
        )
        .unwrap();
        match render(&envelope).unwrap() {
            Rendered::Message(text) => {
                assert!(text.contains("assembled"));
                assert!(text.contains("42s"));
            }
            Rendered::Skip => panic!("expected a message"),
        }
    }

    #[test]
    fn missing_user_id_is_a_validation_error() {
        let envelope = EventEnvelope::new(
            EventType::OrderCreated,
            "order-service",
            "o1",
            &serde_json::json!({"order_id": Uuid::new_v4()}),
        )
        .unwrap();
        let err = recipient_user_id(&envelope).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn malformed_payload_is_a_validation_error() {
        let envelope = EventEnvelope::new(
            EventType::AssemblyCompleted,
            "assembly-service",
            "o1",
            &serde_json::json!({"quality": 3}),
        )
        .unwrap();
        assert!(render(&envelope).is_err());
    }
}
