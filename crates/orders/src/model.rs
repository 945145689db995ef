//! Order aggregate, line items and status log.

use chrono::{DateTime, Utc};
use common::{Currency, Money, OrderId, ProductId, SellerId, UserId};
use serde::{Deserialize, Serialize};

use crate::OrderStatus;

/// A placed purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    /// Reseller the order was placed through; direct orders have none.
    pub seller_id: Option<SellerId>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub commission: Money,
    pub currency: Currency,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A priced line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub commission: Money,
}

impl OrderItem {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money, commission: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            total_price: unit_price.multiply(quantity),
            commission,
        }
    }
}

/// One entry of an order's append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusLog {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderStatusLog {
    pub fn new(order_id: OrderId, status: OrderStatus, notes: Option<String>) -> Self {
        Self {
            order_id,
            status,
            notes,
            created_at: Utc::now(),
        }
    }
}

/// Request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub user_id: UserId,
    #[serde(default)]
    pub seller_id: Option<SellerId>,
    #[serde(default)]
    pub currency: Option<Currency>,
    pub items: Vec<CreateOrderItem>,
}

/// A requested line item before pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price the reseller sells at; validated against the allowed margin.
    #[serde(default)]
    pub selling_price: Option<Money>,
}

/// Generates a human-readable order number: `ORD-<YYYYMMDD>-<8 hex chars>`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

/// Payload of `order.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub seller_id: Option<SellerId>,
    pub total_amount: Money,
    pub commission: Money,
    pub currency: Currency,
}

impl From<&Order> for OrderCreatedEvent {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            seller_id: order.seller_id,
            total_amount: order.total_amount,
            commission: order.commission,
            currency: order.currency.clone(),
        }
    }
}

/// Payload of `order.paid`, `order.delivered` and `order.cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusEvent {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub seller_id: Option<SellerId>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub commission: Money,
    pub notes: Option<String>,
}

impl OrderStatusEvent {
    pub fn new(order: &Order, notes: Option<String>) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            seller_id: order.seller_id,
            status: order.status,
            total_amount: order.total_amount,
            commission: order.commission,
            notes,
        }
    }
}
