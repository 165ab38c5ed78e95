//! Coordinator owning one producer and N named consumers.
//!
//! The coordinator is the per-service entry point to the bus: services
//! register handlers against named consumers, start everything with one
//! call, and get aggregate health plus coordinated shutdown in return.

use crate::consumer::ConsumerGroup;
use crate::error::{BusError, BusResult};
use crate::handler::EventHandler;
use crate::producer::{Delivery, EventProducer};
use rocketry_core::{EventEnvelope, HealthReport, HealthStatus, Payload};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Interval between health loop samples.
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

struct ConsumerEntry {
    group: Arc<ConsumerGroup>,
    task: Option<JoinHandle<()>>,
}

/// Orchestrates one optional producer and any number of named consumers.
pub struct Coordinator {
    service_name: String,
    producer: Option<EventProducer>,
    consumers: Mutex<HashMap<String, ConsumerEntry>>,
    started: Mutex<bool>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Create a coordinator for `service_name` with an optional producer.
    #[must_use]
    pub fn new(service_name: impl Into<String>, producer: Option<EventProducer>) -> Self {
        Self {
            service_name: service_name.into(),
            producer,
            consumers: Mutex::new(HashMap::new()),
            started: Mutex::new(false),
            health_task: Mutex::new(None),
        }
    }

    /// Add a named consumer. Names are unique per coordinator.
    ///
    /// When the coordinator is already running the consumer starts
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DuplicateConsumer`] for a name already in use.
    pub async fn add_consumer(&self, name: impl Into<String>, group: Arc<ConsumerGroup>) -> BusResult<()> {
        let name = name.into();
        let mut consumers = self.consumers.lock().await;
        if consumers.contains_key(&name) {
            return Err(BusError::DuplicateConsumer(name));
        }

        let task = if *self.started.lock().await {
            Some(Arc::clone(&group).start())
        } else {
            None
        };
        info!(service = %self.service_name, consumer = %name, "consumer added");
        consumers.insert(name, ConsumerEntry { group, task });
        Ok(())
    }

    /// Remove a named consumer, draining its in-flight handlers first.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownConsumer`] when the name is not registered.
    pub async fn remove_consumer(&self, name: &str) -> BusResult<()> {
        let entry = {
            let mut consumers = self.consumers.lock().await;
            consumers
                .remove(name)
                .ok_or_else(|| BusError::UnknownConsumer(name.to_string()))?
        };

        entry.group.stop();
        if let Some(task) = entry.task {
            if let Err(e) = task.await {
                warn!(consumer = %name, error = %e, "consumer task ended abnormally");
            }
        }
        info!(service = %self.service_name, consumer = %name, "consumer removed");
        Ok(())
    }

    /// Register a handler on a named consumer for every topic it declares.
    ///
    /// Duplicate topic registrations replace the prior mapping.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownConsumer`] when the name is not registered.
    pub async fn register_handler(
        &self,
        consumer_name: &str,
        handler: Arc<dyn EventHandler>,
    ) -> BusResult<()> {
        let consumers = self.consumers.lock().await;
        let entry = consumers
            .get(consumer_name)
            .ok_or_else(|| BusError::UnknownConsumer(consumer_name.to_string()))?;
        entry.group.registry().register(handler).await;
        Ok(())
    }

    /// Start every consumer and the periodic health loop. Idempotent.
    pub async fn start(self: Arc<Self>) {
        {
            let mut started = self.started.lock().await;
            if *started {
                return;
            }
            *started = true;
        }

        let mut consumers = self.consumers.lock().await;
        for (name, entry) in consumers.iter_mut() {
            if entry.task.is_none() {
                entry.task = Some(Arc::clone(&entry.group).start());
                info!(service = %self.service_name, consumer = %name, "consumer started");
            }
        }
        drop(consumers);

        let coordinator = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let report = coordinator.health_check().await;
                for (component, status) in &report.components {
                    metrics::gauge!(
                        "bus_component_health",
                        "service" => coordinator.service_name.clone(),
                        "component" => component.clone()
                    )
                    .set(status.as_gauge());
                }
            }
        });
        *self.health_task.lock().await = Some(handle);
        info!(service = %self.service_name, "coordinator started");
    }

    /// Delegate a raw send to the producer.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoProducer`] when the coordinator owns none, or
    /// the underlying publish error.
    pub async fn send_message(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: Payload,
        headers: Vec<(String, Vec<u8>)>,
    ) -> BusResult<Delivery> {
        let producer = self.producer.as_ref().ok_or(BusError::NoProducer)?;
        producer.send(topic, key, payload, headers).await
    }

    /// Delegate an envelope publish to the producer.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoProducer`] when the coordinator owns none, or
    /// the underlying publish error.
    pub async fn send_event(&self, envelope: &EventEnvelope) -> BusResult<Delivery> {
        let producer = self.producer.as_ref().ok_or(BusError::NoProducer)?;
        producer.send_event(envelope).await
    }

    /// Aggregate health: producer plus every named consumer.
    pub async fn health_check(&self) -> HealthReport {
        let mut components = BTreeMap::new();

        if let Some(producer) = &self.producer {
            let status = match producer.health_check() {
                Ok(()) => HealthStatus::Healthy,
                Err(_) => HealthStatus::Unhealthy,
            };
            components.insert("producer".to_string(), status);
        }

        let consumers = self.consumers.lock().await;
        for (name, entry) in consumers.iter() {
            let status = if entry.group.is_healthy() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            components.insert(format!("consumer:{name}"), status);
        }
        drop(consumers);

        if *self.started.lock().await {
            HealthReport::aggregate(components)
        } else {
            HealthReport::unhealthy(components)
        }
    }

    /// Stop consumers, the health loop and the producer. Safe to call more
    /// than once.
    pub async fn close(&self) {
        {
            let mut started = self.started.lock().await;
            if !*started {
                return;
            }
            *started = false;
        }

        if let Some(handle) = self.health_task.lock().await.take() {
            handle.abort();
        }

        let mut consumers = self.consumers.lock().await;
        for (name, entry) in consumers.iter_mut() {
            entry.group.stop();
            if let Some(task) = entry.task.take() {
                if let Err(e) = task.await {
                    warn!(consumer = %name, error = %e, "consumer task ended abnormally");
                }
            }
        }
        drop(consumers);

        if let Some(producer) = &self.producer {
            producer.close();
        }
        info!(service = %self.service_name, "coordinator closed");
    }
}
