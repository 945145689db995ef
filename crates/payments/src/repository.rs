//! Payment persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, PaymentId};
use tokio::sync::RwLock;

use crate::{Payment, PaymentError, PaymentLog, Result};

/// Storage for payments and their audit logs.
///
/// Every write carries a log entry and lands together with it.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts a payment. Fails with [`PaymentError::Conflict`] if the order
    /// already has one.
    async fn insert(&self, payment: &Payment, log: &PaymentLog) -> Result<()>;

    /// Overwrites the mutable fields of a payment.
    async fn update(&self, payment: &Payment, log: &PaymentLog) -> Result<()>;

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Log entries of a payment, oldest first.
    async fn logs(&self, payment_id: PaymentId) -> Result<Vec<PaymentLog>>;
}

#[derive(Default)]
struct InMemoryPayments {
    by_order: HashMap<OrderId, Payment>,
    logs: Vec<PaymentLog>,
}

/// In-memory payment repository for development and testing.
#[derive(Clone, Default)]
pub struct InMemoryPaymentRepository {
    state: Arc<RwLock<InMemoryPayments>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored payments.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.by_order.len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: &Payment, log: &PaymentLog) -> Result<()> {
        let mut state = self.state.write().await;
        if state.by_order.contains_key(&payment.order_id) {
            return Err(PaymentError::Conflict(payment.order_id.to_string()));
        }
        state.by_order.insert(payment.order_id, payment.clone());
        state.logs.push(log.clone());
        Ok(())
    }

    async fn update(&self, payment: &Payment, log: &PaymentLog) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .by_order
            .get_mut(&payment.order_id)
            .filter(|p| p.id == payment.id)
            .ok_or_else(|| PaymentError::NotFound(payment.order_id.to_string()))?;
        *stored = payment.clone();
        state.logs.push(log.clone());
        Ok(())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.state.read().await.by_order.get(&order_id).cloned())
    }

    async fn logs(&self, payment_id: PaymentId) -> Result<Vec<PaymentLog>> {
        Ok(self
            .state
            .read()
            .await
            .logs
            .iter()
            .filter(|log| log.payment_id == payment_id)
            .cloned()
            .collect())
    }
}
