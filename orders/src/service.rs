//! Order service: state transitions and the events they emit.

use crate::order::{Order, OrderItem, OrderStatus};
use crate::repository::OrderRepository;
use async_trait::async_trait;
use rocketry_core::events::{OrderCreatedData, OrderStatusChangedData, PaymentProcessedData, PaymentStatus};
use rocketry_core::{Clock, EventEnvelope, EventPublisher, EventType, FabricError};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Hook invoked when an order fails after payment.
///
/// The default implementation only records the intent; wiring an actual
/// payment reversal is a deployment decision.
#[async_trait]
pub trait RefundPolicy: Send + Sync {
    /// React to a post-payment failure.
    ///
    /// # Errors
    ///
    /// Implementations may fail transiently; the caller logs and continues.
    async fn refund(&self, order: &Order, reason: &str) -> Result<(), FabricError> {
        info!(
            order_id = %order.id,
            amount = order.total,
            currency = %order.currency,
            reason,
            "refund requested (no-op policy)"
        );
        Ok(())
    }
}

/// The default, do-nothing refund policy.
pub struct NoRefund;

impl RefundPolicy for NoRefund {}

/// Order service: owns the state machine and the saga's order role.
pub struct OrderService {
    service_name: String,
    repository: Arc<dyn OrderRepository>,
    publisher: Arc<dyn EventPublisher>,
    refund_policy: Arc<dyn RefundPolicy>,
    clock: Arc<dyn Clock>,
}

impl OrderService {
    /// Assemble the service from its capabilities.
    #[must_use]
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        publisher: Arc<dyn EventPublisher>,
        refund_policy: Arc<dyn RefundPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service_name: "order-service".to_string(),
            repository,
            publisher,
            refund_policy,
            clock,
        }
    }

    /// Create a pending order and emit `order.created`.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Validation`] for an empty item list and
    /// repository errors otherwise.
    pub async fn create_order(
        &self,
        user_id: Uuid,
        items: Vec<OrderItem>,
        currency: impl Into<String>,
    ) -> Result<Order, FabricError> {
        if items.is_empty() {
            return Err(FabricError::Validation("order requires at least one item".into()));
        }

        let order = Order::new(user_id, items, currency, self.clock.now());
        self.repository.insert(order.clone()).await?;
        info!(order_id = %order.id, user_id = %user_id, total = order.total, "order created");

        self.emit(
            EventType::OrderCreated,
            order.id,
            &OrderCreatedData {
                order_id: order.id,
                user_id,
                total: order.total,
                currency: order.currency.clone(),
                item_count: order.items.len(),
            },
        )
        .await;
        Ok(order)
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NotFound`] when absent.
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, FabricError> {
        self.repository.get(order_id).await
    }

    /// Settle payment: `pending → paid`, then emit `order.paid` and the
    /// `payment.processed` event that drives the assembly saga.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NotFound`] for an unknown order and
    /// [`FabricError::Validation`] for an illegal transition.
    pub async fn pay_order(&self, order_id: Uuid) -> Result<Order, FabricError> {
        let order = self.transition(order_id, OrderStatus::Paid, EventType::OrderPaid).await?;

        self.emit(
            EventType::PaymentProcessed,
            order.id,
            &PaymentProcessedData {
                order_id: order.id,
                user_id: order.user_id,
                status: PaymentStatus::Completed,
                amount: order.total,
                currency: order.currency.clone(),
                transaction_id: Some(Uuid::new_v4().to_string()),
            },
        )
        .await;
        Ok(order)
    }

    /// Customer confirmation: `assembled → completed`.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NotFound`] for an unknown order and
    /// [`FabricError::Validation`] for an illegal transition.
    pub async fn confirm_order(&self, order_id: Uuid) -> Result<Order, FabricError> {
        self.transition(order_id, OrderStatus::Completed, EventType::OrderStatusChanged)
            .await
    }

    /// Cancel an order that has not been assembled yet.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NotFound`] for an unknown order and
    /// [`FabricError::Validation`] for an illegal transition.
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order, FabricError> {
        self.transition(order_id, OrderStatus::Cancelled, EventType::OrderCancelled)
            .await
    }

    /// Record a finished assembly: `paid → assembled`.
    ///
    /// Idempotent under redelivery: an order already at `assembled` or
    /// beyond is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NotFound`] for an unknown order and
    /// [`FabricError::Validation`] for an illegal transition.
    pub async fn mark_assembled(&self, order_id: Uuid) -> Result<Order, FabricError> {
        let order = self.repository.get(order_id).await?;
        if matches!(order.status, OrderStatus::Assembled | OrderStatus::Completed) {
            return Ok(order);
        }
        self.transition(order_id, OrderStatus::Assembled, EventType::OrderStatusChanged)
            .await
    }

    /// Record a failed assembly: transition to `failed` and invoke the
    /// refund hook.
    ///
    /// Idempotent under redelivery: an order already failed is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NotFound`] for an unknown order and
    /// [`FabricError::Validation`] for an illegal transition.
    pub async fn mark_failed(&self, order_id: Uuid, reason: &str) -> Result<Order, FabricError> {
        let order = self.repository.get(order_id).await?;
        if order.status == OrderStatus::Failed {
            return Ok(order);
        }

        let order = self
            .transition(order_id, OrderStatus::Failed, EventType::OrderStatusChanged)
            .await?;
        if let Err(e) = self.refund_policy.refund(&order, reason).await {
            warn!(order_id = %order_id, error = %e, "refund hook failed");
        }
        Ok(order)
    }

    /// Apply one transition and emit the matching event.
    async fn transition(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        event_type: EventType,
    ) -> Result<Order, FabricError> {
        let mut order = self.repository.get(order_id).await?;
        let old_status = order.status;
        order.update_status(next, self.clock.now())?;
        self.repository.update(order.clone()).await?;
        info!(order_id = %order_id, from = %old_status, to = %next, "order transitioned");

        self.emit(
            event_type,
            order_id,
            &OrderStatusChangedData {
                order_id,
                user_id: order.user_id,
                old_status: old_status.as_str().to_string(),
                new_status: next.as_str().to_string(),
            },
        )
        .await;
        Ok(order)
    }

    async fn emit<T: serde::Serialize>(&self, event_type: EventType, order_id: Uuid, data: &T) {
        let envelope = match EventEnvelope::new(
            event_type,
            self.service_name.clone(),
            order_id.to_string(),
            data,
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(event_type = %event_type, error = %e, "failed to build envelope");
                return;
            }
        };
        if let Err(e) = self.publisher.publish(&envelope).await {
            warn!(
                event_type = %event_type,
                order_id = %order_id,
                error = %e,
                "failed to publish order event"
            );
        }
    }
}
