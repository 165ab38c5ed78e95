//! The assembly saga engine.
//!
//! Consumes settled payments and drives each order through a simulated
//! build: slot acquisition under a concurrency bound, an `assembly.started`
//! emission, simulated work with ±20% variability, then either a quality-
//! graded `assembly.completed` or a catalog-drawn `assembly.failed`.
//!
//! # Invariants
//!
//! - At most one active assembly per order id; a duplicate submission
//!   returns the existing assembly (redeliveries are idempotent).
//! - The number of assemblies in progress never exceeds
//!   `max_concurrent_assemblies`; the semaphore is the sole admission gate.
//! - Cancellation during the simulated work emits nothing; shutdown joins
//!   every processor within the graceful deadline.

use crate::components::synthesize;
use crate::model::{Assembly, AssemblyStatus, FAILURE_CATALOG, derive_quality};
use rand::Rng;
use rocketry_core::events::{AssemblyCompletedData, AssemblyFailedData, AssemblyStartedData};
use rocketry_core::{Clock, EventEnvelope, EventPublisher, EventType, FabricError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Service name stamped as the envelope source.
    pub service_name: String,
    /// Concurrency bound on in-progress assemblies.
    pub max_concurrent_assemblies: usize,
    /// Nominal simulated build time.
    pub simulation_duration: Duration,
    /// Probability of the failure path, in `[0, 1]`.
    pub failure_rate: f64,
    /// How long shutdown waits for processors to drain.
    pub shutdown_timeout: Duration,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            service_name: "assembly-service".to_string(),
            max_concurrent_assemblies: 5,
            simulation_duration: Duration::from_secs(10),
            failure_rate: 0.1,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl AssemblyConfig {
    /// Set the concurrency bound.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_assemblies = max;
        self
    }

    /// Set the nominal simulated build time.
    #[must_use]
    pub const fn with_simulation_duration(mut self, duration: Duration) -> Self {
        self.simulation_duration = duration;
        self
    }

    /// Set the failure probability.
    #[must_use]
    pub const fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }
}

/// The active set: every non-terminal assembly, indexed both ways.
///
/// One lock guards both indexes so the at-most-one-per-order invariant
/// cannot be raced.
#[derive(Default)]
struct ActiveSet {
    by_id: HashMap<Uuid, Assembly>,
    by_order: HashMap<Uuid, Uuid>,
}

/// State shared between the engine handle and its spawned processors.
struct EngineInner {
    config: AssemblyConfig,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    active: RwLock<ActiveSet>,
    semaphore: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
}

/// Bounded-concurrency saga engine for the assembly role.
pub struct AssemblyEngine {
    inner: Arc<EngineInner>,
    tasks: Mutex<JoinSet<()>>,
}

impl AssemblyEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        config: AssemblyConfig,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(EngineInner {
                semaphore: Arc::new(Semaphore::new(config.max_concurrent_assemblies)),
                config,
                publisher,
                clock,
                active: RwLock::new(ActiveSet::default()),
                shutdown_tx: watch::channel(false).0,
            }),
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    /// Accept a settled payment: allocate an assembly and launch its
    /// processor.
    ///
    /// Idempotent per order: when an active assembly already exists for
    /// `order_id`, its id is returned and nothing new is launched.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the `Result` reflects the handler
    /// contract (allocation failures would be `Internal`).
    pub async fn submit(&self, order_id: Uuid, user_id: Uuid) -> Result<Uuid, FabricError> {
        let assembly_id = {
            let mut active = self.inner.active.write().await;
            if let Some(existing) = active.by_order.get(&order_id) {
                debug!(
                    order_id = %order_id,
                    assembly_id = %existing,
                    "active assembly already exists for order, skipping"
                );
                return Ok(*existing);
            }

            let components = synthesize(order_id);
            let assembly = Assembly::new(
                order_id,
                user_id,
                components,
                self.inner.config.simulation_duration.as_secs(),
                self.inner.clock.now(),
            );
            let assembly_id = assembly.id;
            active.by_order.insert(order_id, assembly_id);
            active.by_id.insert(assembly_id, assembly);
            assembly_id
        };

        info!(order_id = %order_id, assembly_id = %assembly_id, "assembly allocated");

        let inner = Arc::clone(&self.inner);
        let mut tasks = self.tasks.lock().await;
        // Reap processors that already finished.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { inner.process(assembly_id, order_id).await });

        Ok(assembly_id)
    }

    /// Number of assemblies currently in progress (holding a slot).
    pub async fn in_progress_count(&self) -> usize {
        self.inner
            .active
            .read()
            .await
            .by_id
            .values()
            .filter(|a| a.status == AssemblyStatus::InProgress)
            .count()
    }

    /// Number of active (non-terminal) assemblies.
    pub async fn active_count(&self) -> usize {
        self.inner.active.read().await.by_id.len()
    }

    /// Snapshot one active assembly.
    pub async fn get(&self, assembly_id: Uuid) -> Option<Assembly> {
        self.inner.active.read().await.by_id.get(&assembly_id).cloned()
    }

    /// Whether an active assembly exists for `order_id`.
    pub async fn has_active_for_order(&self, order_id: Uuid) -> bool {
        self.inner.active.read().await.by_order.contains_key(&order_id)
    }

    /// Cancel processors and join them within the graceful deadline.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let deadline = tokio::time::Instant::now() + self.inner.config.shutdown_timeout;

        let mut tasks = self.tasks.lock().await;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = tasks.len(),
                        "shutdown deadline reached, aborting remaining processors"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }
        info!("assembly engine stopped");
    }
}

impl EngineInner {
    /// The processor for one assembly, from slot acquisition to terminal
    /// emission.
    async fn process(&self, assembly_id: Uuid, order_id: Uuid) {
        let mut shutdown = self.shutdown_tx.subscribe();

        let permit = tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                }
            }
            _ = shutdown.changed() => {
                debug!(assembly_id = %assembly_id, "cancelled while queued");
                return;
            }
        };

        let started_data = {
            let mut active = self.active.write().await;
            let Some(assembly) = active.by_id.get_mut(&assembly_id) else {
                return;
            };
            assembly.status = AssemblyStatus::InProgress;
            assembly.started_at = Some(self.clock.now());
            AssemblyStartedData {
                assembly_id,
                order_id,
                user_id: assembly.user_id,
                estimated_duration_seconds: assembly.estimated_duration_seconds,
                component_count: assembly.components.len(),
            }
        };
        metrics::gauge!("assembly_in_progress").increment(1.0);

        self.emit(EventType::AssemblyStarted, order_id, &started_data).await;

        // Draw the rolls before the await: the thread-local generator must
        // not be held across a suspension point.
        let (sleep_duration, failure_roll, failure_pick) = {
            let mut rng = rand::thread_rng();
            let jitter: f64 = rng.gen_range(-0.2..=0.2);
            let sleep = self.config.simulation_duration.mul_f64(1.0 + jitter);
            let roll: f64 = rng.r#gen();
            let pick = rng.gen_range(0..FAILURE_CATALOG.len());
            (sleep, roll, pick)
        };

        tokio::select! {
            () = tokio::time::sleep(sleep_duration) => {}
            _ = shutdown.changed() => {
                debug!(assembly_id = %assembly_id, "cancelled during simulated work");
                metrics::gauge!("assembly_in_progress").decrement(1.0);
                drop(permit);
                return;
            }
        }

        if failure_roll < self.config.failure_rate {
            self.finish_failed(assembly_id, order_id, failure_pick).await;
        } else {
            self.finish_completed(assembly_id, order_id).await;
        }
        metrics::gauge!("assembly_in_progress").decrement(1.0);
        drop(permit);
    }

    async fn finish_completed(&self, assembly_id: Uuid, order_id: Uuid) {
        let completed_data = {
            let mut active = self.active.write().await;
            let Some(assembly) = active.by_id.get_mut(&assembly_id) else {
                return;
            };
            let now = self.clock.now();
            assembly.status = AssemblyStatus::Completed;
            assembly.completed_at = Some(now);
            #[allow(clippy::cast_sign_loss)]
            let actual_seconds = assembly
                .started_at
                .map_or(0, |started| (now - started).num_seconds().max(0) as u64);
            assembly.actual_duration_seconds = Some(actual_seconds);

            let mut quality = derive_quality(&assembly.components);
            if actual_seconds > 2 * assembly.estimated_duration_seconds {
                quality = quality.downgraded();
            }
            assembly.quality = Some(quality);

            let data = AssemblyCompletedData {
                assembly_id,
                order_id,
                user_id: assembly.user_id,
                quality,
                actual_duration_seconds: actual_seconds,
            };
            active.by_id.remove(&assembly_id);
            active.by_order.remove(&order_id);
            data
        };

        metrics::counter!("assembly_completed_total", "outcome" => "completed").increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::histogram!("assembly_duration_seconds")
            .record(completed_data.actual_duration_seconds as f64);
        info!(
            assembly_id = %assembly_id,
            order_id = %order_id,
            quality = ?completed_data.quality,
            duration_seconds = completed_data.actual_duration_seconds,
            "assembly completed"
        );
        self.emit(EventType::AssemblyCompleted, order_id, &completed_data).await;
    }

    async fn finish_failed(&self, assembly_id: Uuid, order_id: Uuid, pick: usize) {
        let (reason, code) = FAILURE_CATALOG[pick % FAILURE_CATALOG.len()];
        let failed_data = {
            let mut active = self.active.write().await;
            let Some(assembly) = active.by_id.get_mut(&assembly_id) else {
                return;
            };
            assembly.status = AssemblyStatus::Failed;
            assembly.failed_at = Some(self.clock.now());
            assembly.failure_reason = Some(reason.to_string());
            assembly.error_code = Some(code.to_string());

            let data = AssemblyFailedData {
                assembly_id,
                order_id,
                user_id: assembly.user_id,
                reason: reason.to_string(),
                error_code: code.to_string(),
            };
            active.by_id.remove(&assembly_id);
            active.by_order.remove(&order_id);
            data
        };

        metrics::counter!("assembly_completed_total", "outcome" => "failed").increment(1);
        warn!(
            assembly_id = %assembly_id,
            order_id = %order_id,
            reason = %failed_data.reason,
            error_code = %failed_data.error_code,
            "assembly failed"
        );
        self.emit(EventType::AssemblyFailed, order_id, &failed_data).await;
    }

    /// Publish one saga event, logging (not propagating) emission failures.
    async fn emit<T: serde::Serialize>(&self, event_type: EventType, order_id: Uuid, data: &T) {
        let envelope = match EventEnvelope::new(
            event_type,
            self.config.service_name.clone(),
            order_id.to_string(),
            data,
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(event_type = %event_type, error = %e, "failed to build envelope");
                return;
            }
        };
        if let Err(e) = self.publisher.publish(&envelope).await {
            error!(
                event_type = %event_type,
                order_id = %order_id,
                error = %e,
                "failed to publish saga event"
            );
        }
    }
}
