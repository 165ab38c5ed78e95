//! Order persistence capability.

use crate::order::Order;
use async_trait::async_trait;
use rocketry_core::FabricError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage seam for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::Conflict`] when the id already exists.
    async fn insert(&self, order: Order) -> Result<(), FabricError>;

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NotFound`] when absent.
    async fn get(&self, order_id: Uuid) -> Result<Order, FabricError>;

    /// Replace an existing order.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NotFound`] when absent.
    async fn update(&self, order: Order) -> Result<(), FabricError>;

    /// All orders of one user, in insertion order.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, FabricError>;
}

/// In-memory repository guarded by one read-write lock.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: Order) -> Result<(), FabricError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(FabricError::Conflict(format!("order {} already exists", order.id)));
        }
        orders.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Order, FabricError> {
        self.orders
            .read()
            .await
            .get(&order_id)
            .cloned()
            .ok_or_else(|| FabricError::NotFound(format!("order {order_id}")))
    }

    async fn update(&self, order: Order) -> Result<(), FabricError> {
        let mut orders = self.orders.write().await;
        if !orders.contains_key(&order.id) {
            return Err(FabricError::NotFound(format!("order {}", order.id)));
        }
        orders.insert(order.id, order);
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, FabricError> {
        let orders = self.orders.read().await;
        let mut result: Vec<Order> = orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by_key(|order| order.created_at);
        Ok(result)
    }
}
