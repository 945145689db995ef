//! In-process order client used when the order service runs in the same
//! process as the payment ingestor.

use async_trait::async_trait;
use common::OrderId;
use orders::{Order, OrderError, OrderService, OrderStatus};
use payments::{OrderClient, OrderSnapshot, PaymentError};

/// Calls [`OrderService`] directly instead of over HTTP.
#[derive(Clone)]
pub struct LocalOrderClient {
    orders: OrderService,
}

impl LocalOrderClient {
    pub fn new(orders: OrderService) -> Self {
        Self { orders }
    }
}

fn snapshot(order: Order) -> OrderSnapshot {
    OrderSnapshot {
        id: order.id,
        order_number: Some(order.order_number),
        seller_id: order.seller_id,
        total_amount: order.total_amount,
        commission: order.commission,
        currency: order.currency,
        status: order.status.as_str().to_string(),
    }
}

fn upstream(err: OrderError) -> PaymentError {
    match err {
        OrderError::NotFound(id) => PaymentError::NotFound(format!("order {id}")),
        other => PaymentError::Upstream(other.to_string()),
    }
}

#[async_trait]
impl OrderClient for LocalOrderClient {
    async fn mark_paid(&self, order_id: OrderId, notes: &str) -> payments::Result<OrderSnapshot> {
        self.orders
            .update_status(order_id, OrderStatus::Paid, Some(notes.to_string()))
            .await
            .map(snapshot)
            .map_err(upstream)
    }

    async fn get_order(&self, order_id: OrderId) -> payments::Result<OrderSnapshot> {
        self.orders.get(order_id).await.map(snapshot).map_err(upstream)
    }
}
