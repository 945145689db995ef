//! Payment records, audit log and event payloads.

use chrono::{DateTime, Utc};
use common::{Currency, Money, OrderId, PaymentId, SellerId};
use serde::{Deserialize, Serialize};

use crate::PaymentStatus;

/// One gateway transaction attempt for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    /// Weak reference to the order; at most one payment per order.
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: Currency,
    pub method: Option<String>,
    pub status: PaymentStatus,
    /// Gateway order opened for this payment. Set once, never by webhooks.
    pub gateway_order_id: Option<String>,
    /// Gateway payment id last reported by a webhook.
    pub gateway_id: Option<String>,
    /// Last raw gateway payload for this payment.
    pub gateway_response: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A new pending payment.
    pub fn pending(
        order_id: OrderId,
        amount: Money,
        currency: Currency,
        method: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id,
            amount,
            currency,
            method,
            status: PaymentStatus::Pending,
            gateway_order_id: None,
            gateway_id: None,
            gateway_response: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only audit entry for a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLog {
    pub payment_id: PaymentId,
    pub action: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PaymentLog {
    pub fn new(payment_id: PaymentId, action: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            payment_id,
            action: action.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// Request to record a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayment {
    pub order_id: OrderId,
    pub amount: Money,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub method: Option<String>,
}

/// Payload of `payment.success` and `payment.failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcomeEvent {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub seller_id: Option<SellerId>,
    pub amount: Money,
    pub commission: Money,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub gateway_id: Option<String>,
    pub failure_reason: Option<String>,
}
