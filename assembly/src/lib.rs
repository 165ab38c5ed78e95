//! # Rocketry Assembly
//!
//! The assembly role of the order↔payment↔assembly saga.
//!
//! A settled `payment.processed` event allocates an [`model::Assembly`]
//! with a synthesized build plan and launches an async processor. Processors
//! run under a semaphore bound, emit `assembly.started`, perform simulated
//! work with ±20% variability, and finish with either `assembly.completed`
//! (quality-graded from the component mix) or `assembly.failed` (one of
//! five catalog failures).
//!
//! ```text
//! payment.processed ──► submit ──► active set (≤1 per order)
//!                                     │ semaphore slot (bounded)
//!                                     ▼
//!                            assembly.started ─► simulated work
//!                                     │
//!                     ┌───────────────┴───────────────┐
//!                     ▼                               ▼
//!            assembly.completed                assembly.failed
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod components;
pub mod handler;
pub mod model;
pub mod saga;

pub use handler::PaymentProcessedHandler;
pub use model::{Assembly, AssemblyStatus, Component, ComponentKind, Criticality, Material};
pub use saga::{AssemblyConfig, AssemblyEngine};
