//! Typed event contracts exchanged between services.
//!
//! Event types form a dotted hierarchy (`payment.processed`,
//! `assembly.started`, …) and double as broker topic names, so a subscription
//! to a topic always yields envelopes of one known payload shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Broker topics that are not event types (dead-letter fan-out targets).
pub mod topics {
    /// Dead-letter topic for assembly-service consumers.
    pub const ASSEMBLY_DEAD_LETTER: &str = "assembly.dead-letter";
    /// Dead-letter topic for the notification dispatcher.
    pub const NOTIFICATION_DEAD_LETTER: &str = "notification-dead-letter";
}

/// The closed set of domain event types.
///
/// The wire encoding is the dotted string; the same string names the broker
/// topic the event is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A payment reached a terminal outcome.
    PaymentProcessed,
    /// A payment attempt failed.
    PaymentFailed,
    /// An assembly left the queue and started work.
    AssemblyStarted,
    /// An assembly finished successfully.
    AssemblyCompleted,
    /// An assembly failed permanently.
    AssemblyFailed,
    /// An order was created.
    OrderCreated,
    /// An order was paid.
    OrderPaid,
    /// An order was cancelled.
    OrderCancelled,
    /// An order moved between statuses.
    OrderStatusChanged,
}

impl EventType {
    /// All event types, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::PaymentProcessed,
        Self::PaymentFailed,
        Self::AssemblyStarted,
        Self::AssemblyCompleted,
        Self::AssemblyFailed,
        Self::OrderCreated,
        Self::OrderPaid,
        Self::OrderCancelled,
        Self::OrderStatusChanged,
    ];

    /// The dotted wire encoding, also the topic name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentProcessed => "payment.processed",
            Self::PaymentFailed => "payment.failed",
            Self::AssemblyStarted => "assembly.started",
            Self::AssemblyCompleted => "assembly.completed",
            Self::AssemblyFailed => "assembly.failed",
            Self::OrderCreated => "order.created",
            Self::OrderPaid => "order.paid",
            Self::OrderCancelled => "order.cancelled",
            Self::OrderStatusChanged => "order.status.changed",
        }
    }

    /// The broker topic this event type is published to.
    #[must_use]
    pub const fn topic(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type: {s}"))
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Terminal outcome of a payment, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Payment settled; the order may proceed to assembly.
    Completed,
    /// Payment rejected or errored.
    Failed,
    /// Payment still in flight.
    Pending,
}

/// Assembly quality grade, derived after completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Baseline build.
    Standard,
    /// Majority of structural components in high-grade materials.
    High,
    /// Majority of components in premium materials.
    Premium,
}

impl Quality {
    /// One grade lower, saturating at [`Quality::Standard`].
    #[must_use]
    pub const fn downgraded(self) -> Self {
        match self {
            Self::Premium => Self::High,
            Self::High | Self::Standard => Self::Standard,
        }
    }
}

/// Payload of `payment.processed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProcessedData {
    /// Order the payment settles.
    pub order_id: Uuid,
    /// Paying user.
    pub user_id: Uuid,
    /// Terminal outcome of the payment.
    pub status: PaymentStatus,
    /// Settled amount in the order currency.
    pub amount: f64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Gateway transaction reference, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Payload of `assembly.started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyStartedData {
    /// The assembly that started.
    pub assembly_id: Uuid,
    /// Order being assembled.
    pub order_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Planned duration in seconds.
    pub estimated_duration_seconds: u64,
    /// Number of components in the build plan.
    pub component_count: usize,
}

/// Payload of `assembly.completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyCompletedData {
    /// The assembly that completed.
    pub assembly_id: Uuid,
    /// Order being assembled.
    pub order_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Derived quality grade.
    pub quality: Quality,
    /// Wall-clock build time in seconds.
    pub actual_duration_seconds: u64,
}

/// Payload of `assembly.failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyFailedData {
    /// The assembly that failed.
    pub assembly_id: Uuid,
    /// Order being assembled.
    pub order_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Human-readable failure reason.
    pub reason: String,
    /// Stable failure code (`ASM_001`..`ASM_005`).
    pub error_code: String,
}

/// Payload of `order.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    /// The new order.
    pub order_id: Uuid,
    /// Ordering user.
    pub user_id: Uuid,
    /// Order total in the order currency.
    pub total: f64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Number of line items.
    pub item_count: usize,
}

/// Payload of `order.status.changed` (also reused for `order.paid` and
/// `order.cancelled`, which carry the transition that triggered them).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChangedData {
    /// The order that transitioned.
    pub order_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Previous status encoding.
    pub old_status: String,
    /// New status encoding.
    pub new_status: String,
}
