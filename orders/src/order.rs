//! Order model and its status machine.
//!
//! The transition table:
//!
//! ```text
//! pending   → { paid, cancelled, failed }
//! paid      → { assembled, cancelled, failed }
//! assembled → { completed, failed }
//! completed, cancelled, failed → terminal
//! ```
//!
//! Each accepted transition stamps its timestamp exactly once; a timestamp,
//! once set, is never cleared.

use chrono::{DateTime, Utc};
use rocketry_core::FabricError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, payment outstanding.
    Pending,
    /// Payment settled.
    Paid,
    /// Assembly finished, awaiting customer confirmation.
    Assembled,
    /// Confirmed by the customer. Terminal.
    Completed,
    /// Cancelled before completion. Terminal.
    Cancelled,
    /// Failed permanently. Terminal.
    Failed,
}

impl OrderStatus {
    /// Stable lower-case wire encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Assembled => "assembled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Whether the machine accepts `self → next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Cancelled | Self::Failed)
                | (Self::Paid, Self::Assembled | Self::Cancelled | Self::Failed)
                | (Self::Assembled, Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Catalog item id.
    pub item_id: Uuid,
    /// Quantity ordered.
    pub quantity: u32,
    /// Price per unit in the order currency.
    pub unit_price: f64,
    /// Line total (`quantity × unit_price`).
    pub total: f64,
}

impl OrderItem {
    /// Build a line item, computing its total.
    #[must_use]
    pub fn new(item_id: Uuid, quantity: u32, unit_price: f64) -> Self {
        Self {
            item_id,
            quantity,
            unit_price,
            total: f64::from(quantity) * unit_price,
        }
    }
}

/// An order and its lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order id. Doubles as the partitioning subject of every order event.
    pub id: Uuid,
    /// Ordering user.
    pub user_id: Uuid,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Ordered line items.
    pub items: Vec<OrderItem>,
    /// Monetary total across items.
    pub total: f64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// When payment settled.
    pub paid_at: Option<DateTime<Utc>>,
    /// When assembly finished.
    pub assembled_at: Option<DateTime<Utc>>,
    /// When the customer confirmed completion.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a pending order, summing line totals.
    #[must_use]
    pub fn new(user_id: Uuid, items: Vec<OrderItem>, currency: impl Into<String>, now: DateTime<Utc>) -> Self {
        let total = items.iter().map(|item| item.total).sum();
        Self {
            id: Uuid::new_v4(),
            user_id,
            status: OrderStatus::Pending,
            items,
            total,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
            paid_at: None,
            assembled_at: None,
            completed_at: None,
        }
    }

    /// Apply a status transition, stamping the matching timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Validation`] when the transition table rejects
    /// `self.status → next`. Terminal statuses reject everything.
    pub fn update_status(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), FabricError> {
        if !self.status.can_transition_to(next) {
            return Err(FabricError::Validation(format!(
                "invalid order transition {} -> {}",
                self.status, next
            )));
        }

        self.status = next;
        self.updated_at = now;
        // A set timestamp is never cleared or overwritten.
        match next {
            OrderStatus::Paid => self.paid_at = self.paid_at.or(Some(now)),
            OrderStatus::Assembled => self.assembled_at = self.assembled_at.or(Some(now)),
            OrderStatus::Completed => self.completed_at = self.completed_at.or(Some(now)),
            OrderStatus::Pending | OrderStatus::Cancelled | OrderStatus::Failed => {}
        }
        Ok(())
    }
}
