//! # Rocketry Orders
//!
//! The order role of the order↔payment↔assembly saga.
//!
//! Owns the order status machine (`pending → paid → assembled → completed`,
//! with `cancelled`/`failed` exits), emits `payment.processed` when an order
//! is paid, and consumes assembly outcomes to advance or fail the order.
//! All order events are keyed by order id, which keeps one order's lifecycle
//! on one partition.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod handlers;
pub mod order;
pub mod repository;
pub mod service;

pub use handlers::AssemblyEventHandler;
pub use order::{Order, OrderItem, OrderStatus};
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use service::{NoRefund, OrderService, RefundPolicy};
