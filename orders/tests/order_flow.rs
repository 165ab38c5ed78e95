//! Order service flows against the in-memory bus.

#![allow(clippy::unwrap_used)]

use rocketry_core::events::{PaymentProcessedData, PaymentStatus};
use rocketry_core::{EventEnvelope, EventType, FabricError, SystemClock};
use rocketry_orders::{
    AssemblyEventHandler, InMemoryOrderRepository, NoRefund, OrderItem, OrderService, OrderStatus,
};
use rocketry_testing::InMemoryEventBus;
use std::sync::Arc;
use uuid::Uuid;

fn service_with(bus: &Arc<InMemoryEventBus>) -> Arc<OrderService> {
    Arc::new(OrderService::new(
        Arc::new(InMemoryOrderRepository::new()),
        Arc::clone(bus) as Arc<dyn rocketry_core::EventPublisher>,
        Arc::new(NoRefund),
        Arc::new(SystemClock),
    ))
}

fn engine_item() -> OrderItem {
    OrderItem::new(Uuid::new_v4(), 1, 500.0)
}

#[tokio::test]
async fn paying_an_order_emits_payment_processed_keyed_by_order_id() {
    let bus = Arc::new(InMemoryEventBus::new());
    let service = service_with(&bus);

    let order = service
        .create_order(Uuid::new_v4(), vec![engine_item()], "USD")
        .await
        .unwrap();
    let paid = service.pay_order(order.id).await.unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(paid.paid_at.is_some());

    let published = bus.published("payment.processed").await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, order.id.to_string());

    let data: PaymentProcessedData = published[0].payload().unwrap();
    assert_eq!(data.order_id, order.id);
    assert_eq!(data.status, PaymentStatus::Completed);
    assert!((data.amount - 500.0).abs() < f64::EPSILON);
    assert_eq!(data.currency, "USD");
}

#[tokio::test]
async fn order_created_event_carries_totals() {
    let bus = Arc::new(InMemoryEventBus::new());
    let service = service_with(&bus);

    let order = service
        .create_order(
            Uuid::new_v4(),
            vec![
                OrderItem::new(Uuid::new_v4(), 2, 100.0),
                OrderItem::new(Uuid::new_v4(), 1, 300.0),
            ],
            "USD",
        )
        .await
        .unwrap();

    let published = bus.published("order.created").await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].data["item_count"], 2);
    assert!((order.total - 500.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn empty_orders_are_rejected() {
    let bus = Arc::new(InMemoryEventBus::new());
    let service = service_with(&bus);
    let result = service.create_order(Uuid::new_v4(), vec![], "USD").await;
    assert!(matches!(result, Err(FabricError::Validation(_))));
}

#[tokio::test]
async fn assembly_completed_advances_paid_order_to_assembled() {
    let bus = Arc::new(InMemoryEventBus::new());
    let service = service_with(&bus);
    let handler = AssemblyEventHandler::new(Arc::clone(&service));

    let order = service
        .create_order(Uuid::new_v4(), vec![engine_item()], "USD")
        .await
        .unwrap();
    service.pay_order(order.id).await.unwrap();

    let envelope = EventEnvelope::new(
        EventType::AssemblyCompleted,
        "assembly-service",
        order.id.to_string(),
        &serde_json::json!({
            "assembly_id": Uuid::new_v4(),
            "order_id": order.id,
            "user_id": order.user_id,
            "quality": "high",
            "actual_duration_seconds": 12,
        }),
    )
    .unwrap();

    use rocketry_bus::EventHandler;
    handler.handle(&envelope).await.unwrap();

    let updated = service.get_order(order.id).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Assembled);

    // Redelivery of the same envelope is idempotent.
    handler.handle(&envelope).await.unwrap();
    assert_eq!(service.get_order(order.id).await.unwrap().status, OrderStatus::Assembled);

    // Customer confirmation completes the order.
    let completed = service.confirm_order(order.id).await.unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);
    assert!(completed.completed_at.is_some());
}

#[tokio::test]
async fn assembly_failed_fails_the_order() {
    let bus = Arc::new(InMemoryEventBus::new());
    let service = service_with(&bus);
    let handler = AssemblyEventHandler::new(Arc::clone(&service));

    let order = service
        .create_order(Uuid::new_v4(), vec![engine_item()], "USD")
        .await
        .unwrap();
    service.pay_order(order.id).await.unwrap();

    let envelope = EventEnvelope::new(
        EventType::AssemblyFailed,
        "assembly-service",
        order.id.to_string(),
        &serde_json::json!({
            "assembly_id": Uuid::new_v4(),
            "order_id": order.id,
            "user_id": order.user_id,
            "reason": "fuel line pressure test failed",
            "error_code": "ASM_002",
        }),
    )
    .unwrap();

    use rocketry_bus::EventHandler;
    handler.handle(&envelope).await.unwrap();

    let failed = service.get_order(order.id).await.unwrap();
    assert_eq!(failed.status, OrderStatus::Failed);

    // Redelivery is idempotent on a failed order.
    handler.handle(&envelope).await.unwrap();
}

#[tokio::test]
async fn unknown_order_in_assembly_event_is_not_found() {
    let bus = Arc::new(InMemoryEventBus::new());
    let service = service_with(&bus);
    let handler = AssemblyEventHandler::new(service);

    let envelope = EventEnvelope::new(
        EventType::AssemblyCompleted,
        "assembly-service",
        Uuid::new_v4().to_string(),
        &serde_json::json!({
            "assembly_id": Uuid::new_v4(),
            "order_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "quality": "standard",
            "actual_duration_seconds": 3,
        }),
    )
    .unwrap();

    use rocketry_bus::EventHandler;
    let err = handler.handle(&envelope).await.unwrap_err();
    assert!(matches!(err, FabricError::NotFound(_)));
    // Not retryable: the ladder must not spin on a missing order.
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn every_transition_emits_a_status_event() {
    let bus = Arc::new(InMemoryEventBus::new());
    let service = service_with(&bus);

    let order = service
        .create_order(Uuid::new_v4(), vec![engine_item()], "USD")
        .await
        .unwrap();
    service.pay_order(order.id).await.unwrap();
    service.mark_assembled(order.id).await.unwrap();
    service.confirm_order(order.id).await.unwrap();

    assert_eq!(bus.published("order.paid").await.len(), 1);
    // assembled + completed transitions
    assert_eq!(bus.published("order.status.changed").await.len(), 2);

    let changed = bus.published("order.status.changed").await;
    assert_eq!(changed[0].data["old_status"], "paid");
    assert_eq!(changed[0].data["new_status"], "assembled");
    assert_eq!(changed[1].data["new_status"], "completed");
}
