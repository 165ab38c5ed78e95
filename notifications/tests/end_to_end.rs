//! The full order → payment → assembly → notification pipeline over the
//! in-memory bus.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use rocketry_assembly::{AssemblyConfig, AssemblyEngine, PaymentProcessedHandler};
use rocketry_bus::EventHandler;
use rocketry_core::events::AssemblyCompletedData;
use rocketry_core::{EventPublisher, FabricError, Quality, SystemClock};
use rocketry_notifications::{NotificationChannel, NotificationDispatcher, RecipientResolver};
use rocketry_orders::{
    AssemblyEventHandler, InMemoryOrderRepository, NoRefund, OrderItem, OrderService, OrderStatus,
};
use rocketry_testing::InMemoryEventBus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

struct StaticResolver;

#[async_trait]
impl RecipientResolver for StaticResolver {
    async fn chat_id(&self, _user_id: Uuid) -> Result<i64, FabricError> {
        Ok(7)
    }
}

#[derive(Default)]
struct CaptureChannel {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationChannel for CaptureChannel {
    async fn send(&self, _chat_id: i64, text: &str) -> Result<(), FabricError> {
        #[allow(clippy::unwrap_used)]
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Wiring: subscribe a handler to the in-memory bus the way the coordinator
/// subscribes it to broker topics. Subscriptions complete before this
/// returns, so nothing published afterwards is missed.
async fn pump<H: EventHandler + 'static>(
    bus: &Arc<InMemoryEventBus>,
    handler: Arc<H>,
) -> tokio::task::JoinHandle<()> {
    let mut receivers = Vec::new();
    for topic in handler.supported_topics() {
        receivers.push(bus.subscribe(&topic).await);
    }
    tokio::spawn(async move {
        loop {
            let mut delivered = false;
            for receiver in &mut receivers {
                while let Ok(envelope) = receiver.try_recv() {
                    let _ = handler.handle(&envelope).await;
                    delivered = true;
                }
            }
            if !delivered {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
    })
}

async fn wait_until<F, Fut>(deadline: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let end = tokio::time::Instant::now() + deadline;
    while !condition().await {
        assert!(tokio::time::Instant::now() < end, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn paid_order_is_assembled_completed_and_notified() {
    let bus = Arc::new(InMemoryEventBus::new());

    // Order role.
    let orders = Arc::new(OrderService::new(
        Arc::new(InMemoryOrderRepository::new()),
        Arc::clone(&bus) as Arc<dyn EventPublisher>,
        Arc::new(NoRefund),
        Arc::new(SystemClock),
    ));

    // Assembly role: fast simulation, no failures.
    let engine = AssemblyEngine::new(
        AssemblyConfig::default()
            .with_simulation_duration(Duration::from_millis(30))
            .with_failure_rate(0.0),
        Arc::clone(&bus) as Arc<dyn EventPublisher>,
        Arc::new(SystemClock),
    );

    // Notification role.
    let channel = Arc::new(CaptureChannel::default());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::new(StaticResolver),
        Arc::clone(&channel) as Arc<dyn NotificationChannel>,
    ));

    let pumps = vec![
        pump(&bus, Arc::new(PaymentProcessedHandler::new(Arc::clone(&engine)))).await,
        pump(&bus, Arc::new(AssemblyEventHandler::new(Arc::clone(&orders)))).await,
        pump(&bus, dispatcher).await,
    ];

    // Client flow: create then pay.
    let order = orders
        .create_order(Uuid::new_v4(), vec![OrderItem::new(Uuid::new_v4(), 1, 500.0)], "USD")
        .await
        .unwrap();
    orders.pay_order(order.id).await.unwrap();

    // The saga drives the order to `assembled` within the simulation budget.
    wait_until(Duration::from_secs(5), || {
        let orders = Arc::clone(&orders);
        let order_id = order.id;
        async move { orders.get_order(order_id).await.unwrap().status == OrderStatus::Assembled }
    })
    .await;

    let completed = bus.published("assembly.completed").await;
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].subject, order.id.to_string());
    let data: AssemblyCompletedData = completed[0].payload().unwrap();
    assert!(matches!(
        data.quality,
        Quality::Standard | Quality::High | Quality::Premium
    ));

    // Per-subject ordering held across the whole lifecycle.
    let started = bus.published("assembly.started").await;
    assert!(started[0].time <= completed[0].time);

    // The customer saw the lifecycle: payment, assembly start and finish.
    wait_until(Duration::from_secs(5), || {
        let channel = Arc::clone(&channel);
        async move {
            #[allow(clippy::unwrap_used)]
            let sent = channel.sent.lock().unwrap();
            sent.iter().any(|text| text.contains("assembled"))
        }
    })
    .await;

    // Confirmation completes the order.
    orders.confirm_order(order.id).await.unwrap();
    assert_eq!(
        orders.get_order(order.id).await.unwrap().status,
        OrderStatus::Completed
    );

    for pump in pumps {
        pump.abort();
    }
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn forced_failure_fails_the_order_and_notifies() {
    let bus = Arc::new(InMemoryEventBus::new());

    let orders = Arc::new(OrderService::new(
        Arc::new(InMemoryOrderRepository::new()),
        Arc::clone(&bus) as Arc<dyn EventPublisher>,
        Arc::new(NoRefund),
        Arc::new(SystemClock),
    ));
    let engine = AssemblyEngine::new(
        AssemblyConfig::default()
            .with_simulation_duration(Duration::from_millis(10))
            .with_failure_rate(1.0),
        Arc::clone(&bus) as Arc<dyn EventPublisher>,
        Arc::new(SystemClock),
    );
    let channel = Arc::new(CaptureChannel::default());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::new(StaticResolver),
        Arc::clone(&channel) as Arc<dyn NotificationChannel>,
    ));

    let pumps = vec![
        pump(&bus, Arc::new(PaymentProcessedHandler::new(Arc::clone(&engine)))).await,
        pump(&bus, Arc::new(AssemblyEventHandler::new(Arc::clone(&orders)))).await,
        pump(&bus, dispatcher).await,
    ];

    let order = orders
        .create_order(Uuid::new_v4(), vec![OrderItem::new(Uuid::new_v4(), 1, 500.0)], "USD")
        .await
        .unwrap();
    orders.pay_order(order.id).await.unwrap();

    wait_until(Duration::from_secs(5), || {
        let orders = Arc::clone(&orders);
        let order_id = order.id;
        async move { orders.get_order(order_id).await.unwrap().status == OrderStatus::Failed }
    })
    .await;

    assert!(bus.published("assembly.completed").await.is_empty());
    assert_eq!(bus.published("assembly.failed").await.len(), 1);

    // Failed is terminal: confirmation is rejected.
    assert!(orders.confirm_order(order.id).await.is_err());

    for pump in pumps {
        pump.abort();
    }
    engine.shutdown().await;
}
