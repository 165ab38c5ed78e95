//! # Rocketry Core
//!
//! Shared contracts for the Rocketry service fabric.
//!
//! This crate defines what every service agrees on and nothing more:
//!
//! - [`envelope`]: the uniform event envelope, its JSON wire form, and the
//!   broker header codec
//! - [`events`]: the closed set of event types and their typed payloads
//! - [`error`]: the failure taxonomy that drives retry, dead-letter and
//!   RPC-status decisions
//! - [`health`]: the health reporting contract components aggregate into
//! - [`environment`]: ambient capabilities (clock) injected at construction
//!
//! Transport, storage and saga machinery live in the dedicated crates
//! (`rocketry-bus`, `rocketry-iam`, …), all of which depend on these
//! contracts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod environment;
pub mod error;
pub mod events;
pub mod health;
pub mod publisher;

pub use envelope::{DecodedHeaders, EnvelopeError, EventEnvelope, Payload};
pub use environment::{Clock, SystemClock};
pub use error::{ErrorKind, FabricError};
pub use events::{EventType, PaymentStatus, Quality};
pub use health::{HealthReport, HealthStatus};
pub use publisher::EventPublisher;
