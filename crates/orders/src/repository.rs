//! Order persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::{Order, OrderError, OrderStatus, OrderStatusLog, Result};

/// Storage for orders, their items and status history.
///
/// Each write lands together with its status log row or not at all.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts an order with its items and initial status log row.
    async fn insert(&self, order: &Order, log: &OrderStatusLog) -> Result<()>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Orders placed by a user, newest first.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Moves an order to `log.status` if it is still in `expected`, appending
    /// the log row. Returns the updated order.
    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        log: &OrderStatusLog,
    ) -> Result<Order>;

    /// Status log rows of an order, oldest first.
    async fn status_history(&self, id: OrderId) -> Result<Vec<OrderStatusLog>>;
}

#[derive(Default)]
struct InMemoryOrders {
    orders: HashMap<OrderId, Order>,
    logs: Vec<OrderStatusLog>,
}

/// In-memory order repository for development and testing.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<InMemoryOrders>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of status log rows stored.
    pub async fn log_count(&self) -> usize {
        self.state.read().await.logs.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order, log: &OrderStatusLog) -> Result<()> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id)
            || state
                .orders
                .values()
                .any(|o| o.order_number == order.order_number)
        {
            return Err(OrderError::Validation(format!(
                "order {} already exists",
                order.order_number
            )));
        }
        state.orders.insert(order.id, order.clone());
        state.logs.push(log.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        log: &OrderStatusLog,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.orders.get_mut(&id).ok_or(OrderError::NotFound(id))?;
        if order.status != expected {
            return Err(OrderError::Conflict {
                order_id: id,
                expected,
            });
        }

        order.status = log.status;
        order.updated_at = Utc::now();
        let updated = order.clone();
        state.logs.push(log.clone());
        Ok(updated)
    }

    async fn status_history(&self, id: OrderId) -> Result<Vec<OrderStatusLog>> {
        let state = self.state.read().await;
        if !state.orders.contains_key(&id) {
            return Err(OrderError::NotFound(id));
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| log.order_id == id)
            .cloned()
            .collect())
    }
}
