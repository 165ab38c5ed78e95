//! # Rocketry Bus
//!
//! Publish/subscribe machinery over a partitioned, group-coordinated,
//! Kafka-compatible broker. Uses rdkafka so any Kafka-protocol system
//! (Redpanda, Apache Kafka, MSK, …) can back it.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐   send_event    ┌─────────────┐
//! │ EventProducer  │────────────────►│   Broker    │
//! └────────────────┘                 │ (partitions)│
//!                                    └──────┬──────┘
//!                                           │ partition claims
//!                                           ▼
//! ┌──────────────────────────────────────────────────────┐
//! │ ConsumerGroup (one member)                           │
//! │   decode → registry lookup → semaphore slot          │
//! │   → handler (deadline) → retry ladder → DLQ │ offset │
//! └──────────────────────────────────────────────────────┘
//!                    ▲
//!                    │ named consumers, handlers, health, lifecycle
//!            ┌───────┴───────┐
//!            │  Coordinator  │
//!            └───────────────┘
//! ```
//!
//! # Delivery semantics
//!
//! At-least-once with mark-after-terminal offsets: a message's offset is
//! stored only after its handler succeeded, failed permanently, or was
//! dead-lettered; the client's periodic auto-commit flushes stored offsets.
//! Ordering is per partition; envelopes keyed by order id therefore observe
//! per-order ordering end to end.
//!
//! # Example
//!
//! ```no_run
//! use rocketry_bus::{Coordinator, ConsumerConfig, ConsumerGroup, EventProducer,
//!     HandlerRegistry, ProducerConfig, SessionHooks};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let producer = EventProducer::new(
//!     ProducerConfig::builder("localhost:9092", "order-service-1").build()?,
//! )?;
//!
//! let consumer = Arc::new(ConsumerGroup::new(
//!     ConsumerConfig::builder(
//!         "localhost:9092",
//!         "order-service",
//!         vec!["assembly.completed".to_string(), "assembly.failed".to_string()],
//!     )
//!     .concurrency_level(4)
//!     .build()?,
//!     Arc::new(HandlerRegistry::new()),
//!     None,
//!     SessionHooks::default(),
//! )?);
//!
//! let coordinator = Arc::new(Coordinator::new("order-service", Some(producer)));
//! coordinator.add_consumer("assembly-events", consumer).await?;
//! coordinator.start().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod dlq;
pub mod error;
pub mod handler;
pub mod producer;
pub mod retry;
pub mod shutdown;

pub use config::{Acks, Compression, ConsumerConfig, InitialOffset, ProducerConfig};
pub use consumer::{ConsumerGroup, MemberState, SessionHooks};
pub use coordinator::Coordinator;
pub use dlq::DlqProducer;
pub use error::{BusError, BusResult};
pub use handler::{EventHandler, HandlerRegistry, InboundMessage};
pub use producer::{Delivery, EventProducer};
pub use retry::{LadderOutcome, RetryPolicy, run_ladder};
pub use shutdown::InflightTracker;
