//! Order service: creation, status transitions and lifecycle events.

use std::sync::Arc;

use chrono::Utc;
use common::{Money, OrderId, UserId};
use event_bus::{EventBus, keys};

use crate::model::generate_order_number;
use crate::pricing::{MarginRequest, PricingClient, PricingItem, PricingRequest, Quote};
use crate::repository::OrderRepository;
use crate::{
    CreateOrder, Order, OrderCreatedEvent, OrderError, OrderItem, OrderStatus, OrderStatusEvent,
    OrderStatusLog, Result,
};

/// Service owning the order lifecycle.
///
/// Orders are written before any event is published. Publication is
/// best-effort: a failed publish is logged and the operation still
/// succeeds.
#[derive(Clone)]
pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
    pricing: Arc<dyn PricingClient>,
    bus: EventBus,
}

impl OrderService {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        pricing: Arc<dyn PricingClient>,
        bus: EventBus,
    ) -> Self {
        Self {
            repository,
            pricing,
            bus,
        }
    }

    /// Prices and places an order.
    ///
    /// Fails without writing anything if the pricing service errors or
    /// rejects a reseller's margin.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, items = request.items.len()))]
    pub async fn create(&self, request: CreateOrder) -> Result<Order> {
        if request.items.is_empty() {
            return Err(OrderError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }
        if let Some(item) = request.items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::Validation(format!(
                "quantity for {} must be positive",
                item.product_id
            )));
        }

        for item in &request.items {
            let Some(selling_price) = item.selling_price else {
                continue;
            };
            let check = self
                .pricing
                .validate_margin(&MarginRequest {
                    product_id: item.product_id.clone(),
                    selling_price,
                    seller_id: request.seller_id,
                })
                .await?;
            if !check.valid {
                return Err(OrderError::Validation(check.message.unwrap_or_else(|| {
                    format!("selling price for {} is outside the allowed margin", item.product_id)
                })));
            }
        }

        let quote = self
            .pricing
            .calculate(&PricingRequest {
                items: request
                    .items
                    .iter()
                    .map(|i| PricingItem {
                        product_id: i.product_id.clone(),
                        quantity: i.quantity,
                        selling_price: i.selling_price,
                    })
                    .collect(),
                seller_id: request.seller_id,
            })
            .await?;
        let items = priced_items(&request, &quote)?;

        let total_amount: Money = items.iter().map(|i| i.total_price).sum();
        let commission: Money = items.iter().map(|i| i.commission).sum();
        if total_amount != quote.summary.total_amount
            || commission != quote.summary.total_commission
        {
            tracing::warn!(
                %total_amount,
                quoted_total = %quote.summary.total_amount,
                %commission,
                quoted_commission = %quote.summary.total_commission,
                "pricing summary disagrees with line items, using line items"
            );
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId::new(),
            order_number: generate_order_number(now),
            user_id: request.user_id,
            seller_id: request.seller_id,
            status: OrderStatus::Pending,
            total_amount,
            commission,
            currency: request.currency.unwrap_or_default(),
            items,
            created_at: now,
            updated_at: now,
        };
        let log = OrderStatusLog::new(order.id, OrderStatus::Pending, Some("Order created".into()));

        self.repository.insert(&order, &log).await?;
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, order_number = %order.order_number, "order created");

        if !self
            .bus
            .publish(keys::ORDER_CREATED, &OrderCreatedEvent::from(&order))
            .await
        {
            tracing::warn!(order_id = %order.id, "order.created not published");
        }

        Ok(order)
    }

    /// Moves an order through the status state machine.
    #[tracing::instrument(skip(self, notes))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        notes: Option<String>,
    ) -> Result<Order> {
        let current = self.get(id).await?;
        if !current.status.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let log = OrderStatusLog::new(id, status, notes.clone());
        let order = self
            .repository
            .update_status(id, current.status, &log)
            .await?;
        metrics::counter!("order_status_transitions_total", "status" => status.as_str())
            .increment(1);
        tracing::info!(order_id = %id, from = %current.status, to = %status, "order status updated");

        if let Some(routing_key) = status.lifecycle_event()
            && !self
                .bus
                .publish(routing_key, &OrderStatusEvent::new(&order, notes))
                .await
        {
            tracing::warn!(order_id = %id, routing_key, "order lifecycle event not published");
        }

        Ok(order)
    }

    /// Loads an order.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: OrderId) -> Result<Order> {
        self.repository
            .get(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.repository.list_by_user(user_id).await
    }

    pub async fn status_history(&self, id: OrderId) -> Result<Vec<OrderStatusLog>> {
        self.repository.status_history(id).await
    }
}

/// Turns a quote into order items, checking it covers exactly the requested items.
fn priced_items(request: &CreateOrder, quote: &Quote) -> Result<Vec<OrderItem>> {
    if quote.items.len() != request.items.len() {
        return Err(OrderError::Upstream(format!(
            "pricing returned {} items for {} requested",
            quote.items.len(),
            request.items.len()
        )));
    }

    request
        .items
        .iter()
        .zip(&quote.items)
        .map(|(requested, priced)| {
            if priced.product_id != requested.product_id || priced.quantity != requested.quantity {
                return Err(OrderError::Upstream(format!(
                    "pricing returned {} x{} for {} x{}",
                    priced.product_id, priced.quantity, requested.product_id, requested.quantity
                )));
            }
            let item = OrderItem::new(
                priced.product_id.clone(),
                priced.quantity,
                priced.unit_price,
                priced.commission,
            );
            if item.total_price != priced.total_price {
                return Err(OrderError::Upstream(format!(
                    "pricing total {} for {} does not match {} x {}",
                    priced.total_price, priced.product_id, priced.unit_price, priced.quantity
                )));
            }
            Ok(item)
        })
        .collect()
}
