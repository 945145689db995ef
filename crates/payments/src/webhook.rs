//! Gateway webhook payloads.
//!
//! Payloads follow the gateway's envelope:
//!
//! ```json
//! {"event": "payment.captured",
//!  "payload": {"payment": {"entity": {"id": "pay_1", "status": "captured",
//!                                     "notes": {"orderId": "..."}}}}}
//! ```
//!
//! The merchant order id is only ever read from an entity's `notes` or
//! `metadata`, never from a top-level body field.

use common::OrderId;
use serde::Deserialize;
use serde_json::Value;

use crate::{PaymentError, PaymentStatus, Result, status::map_gateway_status};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub payload: WebhookEntities,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEntities {
    #[serde(default)]
    pub payment: Option<EntityWrapper>,
    #[serde(default)]
    pub order: Option<EntityWrapper>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityWrapper {
    pub entity: GatewayEntity,
}

/// A payment or order entity as sent by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayEntity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Free-form merchant data. Sent as `[]` when empty.
    #[serde(default)]
    pub notes: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl GatewayEntity {
    fn merchant_order_id(&self) -> Option<&str> {
        self.notes
            .get("orderId")
            .or_else(|| self.notes.get("order_id"))
            .or_else(|| self.metadata.get("orderId"))
            .and_then(Value::as_str)
    }
}

/// What a webhook says about a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookNotice {
    pub event: Option<String>,
    pub order_id: OrderId,
    pub status: PaymentStatus,
    /// Gateway payment id; an order entity's id is never reported here.
    pub gateway_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<(Self, Value)> {
        let raw: Value = serde_json::from_slice(body)
            .map_err(|e| PaymentError::Validation(format!("invalid webhook body: {e}")))?;
        let payload = serde_json::from_value(raw.clone())
            .map_err(|e| PaymentError::Validation(format!("invalid webhook body: {e}")))?;
        Ok((payload, raw))
    }

    /// Extracts the merchant order id and the mapped status.
    ///
    /// The payment entity is preferred; the order entity is the fallback.
    pub fn notice(&self) -> Result<WebhookNotice> {
        let payment = self.payload.payment.as_ref().map(|w| &w.entity);
        let order = self.payload.order.as_ref().map(|w| &w.entity);

        let raw_order_id = payment
            .and_then(GatewayEntity::merchant_order_id)
            .or_else(|| order.and_then(GatewayEntity::merchant_order_id))
            .ok_or_else(|| {
                PaymentError::Validation("webhook carries no merchant order id".to_string())
            })?;
        let order_id = OrderId::parse(raw_order_id).map_err(|_| {
            PaymentError::Validation(format!("invalid merchant order id: {raw_order_id}"))
        })?;

        let entity = payment.or(order);
        let status = map_gateway_status(
            self.event.as_deref(),
            entity.and_then(|e| e.status.as_deref()),
        );

        Ok(WebhookNotice {
            event: self.event.clone(),
            order_id,
            status,
            gateway_id: payment.and_then(|p| p.id.clone()),
            failure_reason: payment.and_then(|p| p.error_description.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> WebhookPayload {
        WebhookPayload::parse(value.to_string().as_bytes()).unwrap().0
    }

    #[test]
    fn test_order_id_from_payment_notes() {
        let order_id = OrderId::new();
        let notice = parse(json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {
                "id": "pay_1", "status": "captured", "order_id": "order_gw_1",
                "notes": {"orderId": order_id.to_string()}
            }}}
        }))
        .notice()
        .unwrap();

        assert_eq!(notice.order_id, order_id);
        assert_eq!(notice.status, PaymentStatus::Success);
        assert_eq!(notice.gateway_id.as_deref(), Some("pay_1"));
    }

    #[test]
    fn test_order_id_falls_back_to_order_entity() {
        let order_id = OrderId::new();
        let notice = parse(json!({
            "event": "order.paid",
            "payload": {
                "payment": {"entity": {"id": "pay_2", "notes": []}},
                "order": {"entity": {"id": "order_gw_2", "notes": {"order_id": order_id.to_string()}}}
            }
        }))
        .notice()
        .unwrap();

        assert_eq!(notice.order_id, order_id);
        assert_eq!(notice.gateway_id.as_deref(), Some("pay_2"));
    }

    #[test]
    fn test_order_entity_id_is_not_a_payment_id() {
        let order_id = OrderId::new();
        let notice = parse(json!({
            "event": "order.paid",
            "payload": {"order": {"entity": {
                "id": "order_gw_3", "status": "paid",
                "notes": {"orderId": order_id.to_string()}
            }}}
        }))
        .notice()
        .unwrap();

        assert_eq!(notice.status, PaymentStatus::Success);
        assert!(notice.gateway_id.is_none());
    }

    #[test]
    fn test_order_id_from_metadata() {
        let order_id = OrderId::new();
        let notice = parse(json!({
            "payload": {"payment": {"entity": {
                "status": "failed",
                "metadata": {"orderId": order_id.to_string()},
                "error_description": "card declined"
            }}}
        }))
        .notice()
        .unwrap();

        assert_eq!(notice.status, PaymentStatus::Failed);
        assert_eq!(notice.failure_reason.as_deref(), Some("card declined"));
    }

    #[test]
    fn test_top_level_order_id_is_ignored() {
        let result = parse(json!({
            "event": "payment.captured",
            "orderId": OrderId::new().to_string(),
            "payload": {"payment": {"entity": {"id": "pay_3"}}}
        }))
        .notice();

        assert!(matches!(result, Err(PaymentError::Validation(_))));
    }

    #[test]
    fn test_malformed_body_is_validation_error() {
        assert!(matches!(
            WebhookPayload::parse(b"not json"),
            Err(PaymentError::Validation(_))
        ));
    }
}
