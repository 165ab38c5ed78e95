//! End-to-end saga behavior against the in-memory bus.

#![allow(clippy::unwrap_used)]

use rocketry_assembly::{AssemblyConfig, AssemblyEngine};
use rocketry_core::events::{AssemblyCompletedData, AssemblyFailedData};
use rocketry_core::{Quality, SystemClock};
use rocketry_testing::InMemoryEventBus;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn engine_with(
    bus: &Arc<InMemoryEventBus>,
    max_concurrent: usize,
    simulation: Duration,
    failure_rate: f64,
) -> Arc<AssemblyEngine> {
    AssemblyEngine::new(
        AssemblyConfig::default()
            .with_max_concurrent(max_concurrent)
            .with_simulation_duration(simulation)
            .with_failure_rate(failure_rate),
        Arc::clone(bus) as Arc<dyn rocketry_core::EventPublisher>,
        Arc::new(SystemClock),
    )
}

/// Poll until `topic` has at least `count` envelopes or the deadline passes.
async fn wait_for_published(bus: &InMemoryEventBus, topic: &str, count: usize, deadline: Duration) {
    let end = tokio::time::Instant::now() + deadline;
    loop {
        if bus.published(topic).await.len() >= count {
            return;
        }
        assert!(
            tokio::time::Instant::now() < end,
            "timed out waiting for {count} envelopes on {topic}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_emits_started_then_completed() {
    let bus = Arc::new(InMemoryEventBus::new());
    let engine = engine_with(&bus, 5, Duration::from_millis(20), 0.0);

    let order_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    engine.submit(order_id, user_id).await.unwrap();

    // Terminal event expected well within 2x the simulated duration budget.
    wait_for_published(&bus, "assembly.completed", 1, Duration::from_secs(2)).await;

    let started = bus.published("assembly.started").await;
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].subject, order_id.to_string());

    let completed = bus.published("assembly.completed").await;
    let data: AssemblyCompletedData = completed[0].payload().unwrap();
    assert_eq!(data.order_id, order_id);
    assert_eq!(data.user_id, user_id);
    assert!(matches!(
        data.quality,
        Quality::Standard | Quality::High | Quality::Premium
    ));

    // Terminal assemblies leave the active set.
    assert_eq!(engine.active_count().await, 0);
    assert!(!engine.has_active_for_order(order_id).await);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn certain_failure_emits_failed_and_never_completed() {
    let bus = Arc::new(InMemoryEventBus::new());
    let engine = engine_with(&bus, 5, Duration::from_millis(10), 1.0);

    let order_id = Uuid::new_v4();
    engine.submit(order_id, Uuid::new_v4()).await.unwrap();

    wait_for_published(&bus, "assembly.failed", 1, Duration::from_secs(2)).await;

    let failed = bus.published("assembly.failed").await;
    let data: AssemblyFailedData = failed[0].payload().unwrap();
    assert_eq!(data.order_id, order_id);
    let known_codes = ["ASM_001", "ASM_002", "ASM_003", "ASM_004", "ASM_005"];
    assert!(known_codes.contains(&data.error_code.as_str()));
    assert!(!data.reason.is_empty());

    assert!(bus.published("assembly.completed").await.is_empty());
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrency_never_exceeds_the_bound() {
    let bus = Arc::new(InMemoryEventBus::new());
    let engine = engine_with(&bus, 2, Duration::from_millis(60), 0.0);

    for _ in 0..5 {
        engine.submit(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
    }

    // Sample the in-progress count while the five builds drain through the
    // two slots.
    let sampler = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut max_observed = 0;
            for _ in 0..100 {
                max_observed = max_observed.max(engine.in_progress_count().await);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            max_observed
        })
    };

    wait_for_published(&bus, "assembly.completed", 5, Duration::from_secs(5)).await;
    let max_observed = sampler.await.unwrap();

    assert!(max_observed <= 2, "observed {max_observed} concurrent builds");
    assert_eq!(bus.published("assembly.completed").await.len(), 5);
    assert_eq!(bus.published("assembly.started").await.len(), 5);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_submission_for_one_order_is_idempotent() {
    let bus = Arc::new(InMemoryEventBus::new());
    let engine = engine_with(&bus, 1, Duration::from_millis(100), 0.0);

    let order_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let first = engine.submit(order_id, user_id).await.unwrap();
    let second = engine.submit(order_id, user_id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.active_count().await, 1);

    wait_for_published(&bus, "assembly.completed", 1, Duration::from_secs(2)).await;
    // Exactly one build ran for the duplicated order.
    assert_eq!(bus.published("assembly.started").await.len(), 1);
    assert_eq!(bus.published("assembly.completed").await.len(), 1);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_during_work_emits_no_terminal_event() {
    let bus = Arc::new(InMemoryEventBus::new());
    let engine = engine_with(&bus, 2, Duration::from_secs(30), 0.0);

    engine.submit(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
    wait_for_published(&bus, "assembly.started", 1, Duration::from_secs(2)).await;

    engine.shutdown().await;

    assert!(bus.published("assembly.completed").await.is_empty());
    assert!(bus.published("assembly.failed").await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn per_order_events_preserve_emission_order() {
    let bus = Arc::new(InMemoryEventBus::new());
    let engine = engine_with(&bus, 1, Duration::from_millis(10), 0.0);

    let order_id = Uuid::new_v4();
    engine.submit(order_id, Uuid::new_v4()).await.unwrap();
    wait_for_published(&bus, "assembly.completed", 1, Duration::from_secs(2)).await;

    let started = bus.published("assembly.started").await;
    let completed = bus.published("assembly.completed").await;
    assert!(started[0].time <= completed[0].time);
    assert_eq!(started[0].subject, completed[0].subject);
    engine.shutdown().await;
}
