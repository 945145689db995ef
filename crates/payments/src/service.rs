//! Payment service: intents, gateway orders and webhook ingestion.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{Currency, Money, OrderId, PaymentId};
use event_bus::{EventBus, keys};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::gateway::{GatewayOrder, GatewayOrderRequest, PaymentGateway};
use crate::order_client::{OrderClient, OrderSnapshot};
use crate::repository::PaymentRepository;
use crate::webhook::WebhookPayload;
use crate::{
    CreatePayment, Payment, PaymentError, PaymentLog, PaymentOutcomeEvent, PaymentStatus, Result,
    signature,
};

/// Request to open a gateway-side payment for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGatewayOrder {
    pub order_id: OrderId,
    pub amount: Money,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub method: Option<String>,
}

/// A local payment paired with its gateway order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCheckout {
    pub payment: Payment,
    pub gateway_order: GatewayOrder,
}

/// Service owning payments and their gateway interactions.
#[derive(Clone)]
pub struct PaymentService {
    repository: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderClient>,
    bus: EventBus,
    webhook_secret: Option<String>,
}

impl PaymentService {
    pub fn new(
        repository: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderClient>,
        bus: EventBus,
        webhook_secret: Option<String>,
    ) -> Self {
        if webhook_secret.is_none() {
            tracing::warn!("webhook secret not configured, webhook signatures will not be checked");
        }
        Self {
            repository,
            gateway,
            orders,
            bus,
            webhook_secret,
        }
    }

    /// Records a pending payment for an order. One payment per order.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create(&self, request: CreatePayment) -> Result<Payment> {
        if !request.amount.is_positive() {
            return Err(PaymentError::Validation("amount must be positive".to_string()));
        }
        if self.repository.get_by_order(request.order_id).await?.is_some() {
            return Err(PaymentError::Conflict(request.order_id.to_string()));
        }

        let payment = Payment::pending(
            request.order_id,
            request.amount,
            request.currency.unwrap_or_default(),
            request.method,
        );
        let log = PaymentLog::new(
            payment.id,
            "initiated",
            json!({"amount": payment.amount, "method": payment.method}),
        );
        self.repository.insert(&payment, &log).await?;

        tracing::info!(payment_id = %payment.id, "payment initiated");
        Ok(payment)
    }

    /// Opens a gateway order for an order's payment.
    ///
    /// Idempotent: if the payment already carries a gateway order id, the
    /// existing gateway order is fetched and returned instead of creating
    /// another. The id is stored only after the gateway accepted the order;
    /// a gateway failure marks the payment FAILED.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_gateway_order(&self, request: CreateGatewayOrder) -> Result<GatewayCheckout> {
        let existing = self.repository.get_by_order(request.order_id).await?;

        if let Some(payment) = &existing
            && let Some(gateway_order_id) = &payment.gateway_order_id
        {
            let gateway_order = self.gateway.fetch_order(gateway_order_id).await?;
            tracing::info!(payment_id = %payment.id, %gateway_order_id, "reusing existing gateway order");
            return Ok(GatewayCheckout {
                payment: payment.clone(),
                gateway_order,
            });
        }

        let mut payment = match existing {
            Some(payment) => payment,
            None => {
                self.create(CreatePayment {
                    order_id: request.order_id,
                    amount: request.amount,
                    currency: request.currency.clone(),
                    method: request.method.clone(),
                })
                .await?
            }
        };

        let amount = payment.amount.to_minor().ok_or_else(|| {
            PaymentError::Validation(format!("amount {} is out of range", payment.amount))
        })?;
        let gateway_request = GatewayOrderRequest {
            amount,
            currency: payment.currency.to_string(),
            receipt: payment.id.to_string(),
            notes: HashMap::from([("orderId".to_string(), payment.order_id.to_string())]),
        };

        match self.gateway.create_order(&gateway_request).await {
            Ok(gateway_order) => {
                payment.status = PaymentStatus::Pending;
                payment.gateway_order_id = Some(gateway_order.id.clone());
                payment.gateway_response = Some(serde_json::to_value(&gateway_order)?);
                payment.failure_reason = None;
                payment.updated_at = Utc::now();
                let log = PaymentLog::new(
                    payment.id,
                    "gateway_order_created",
                    json!({"gatewayOrderId": gateway_order.id}),
                );
                self.repository.update(&payment, &log).await?;

                tracing::info!(payment_id = %payment.id, gateway_order_id = %gateway_order.id, "gateway order created");
                Ok(GatewayCheckout {
                    payment,
                    gateway_order,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                payment.status = PaymentStatus::Failed;
                payment.failure_reason = Some(reason.clone());
                payment.updated_at = Utc::now();
                let log = PaymentLog::new(
                    payment.id,
                    "gateway_order_failed",
                    json!({"reason": reason}),
                );
                self.repository.update(&payment, &log).await?;

                tracing::error!(payment_id = %payment.id, error = %reason, "gateway order creation failed");
                Err(e)
            }
        }
    }

    /// Ingests a gateway webhook.
    ///
    /// The signature is checked against the raw body before anything is
    /// parsed. The payment is updated and logged before any outward call;
    /// the order status push and the outcome event are best-effort.
    /// Safe to call repeatedly with the same payload, though the outcome
    /// event is published each time.
    #[tracing::instrument(skip(self, raw_body, signature), fields(bytes = raw_body.len()))]
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<Payment> {
        if let Err(e) = self.authenticate(raw_body, signature) {
            metrics::counter!("payment_webhooks_total", "outcome" => "rejected").increment(1);
            tracing::warn!(error = %e, "webhook rejected");
            return Err(e);
        }

        let (payload, raw) = WebhookPayload::parse(raw_body)?;
        let notice = payload.notice()?;

        let Some(mut payment) = self.repository.get_by_order(notice.order_id).await? else {
            metrics::counter!("payment_webhooks_total", "outcome" => "not_found").increment(1);
            return Err(PaymentError::NotFound(notice.order_id.to_string()));
        };

        let previous = payment.status;
        payment.status = notice.status;
        if notice.gateway_id.is_some() {
            payment.gateway_id = notice.gateway_id.clone();
        }
        payment.gateway_response = Some(raw);
        payment.failure_reason = notice.failure_reason.clone();
        payment.updated_at = Utc::now();

        let log = PaymentLog::new(
            payment.id,
            "webhook_received",
            json!({
                "event": notice.event,
                "status": notice.status,
                "previousStatus": previous,
                "gatewayId": notice.gateway_id,
            }),
        );
        self.repository.update(&payment, &log).await?;
        metrics::counter!("payment_webhooks_total", "outcome" => "processed").increment(1);
        tracing::info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            from = %previous,
            to = %payment.status,
            "payment updated from webhook"
        );

        let routing_key = match payment.status {
            PaymentStatus::Success => keys::PAYMENT_SUCCESS,
            PaymentStatus::Failed => keys::PAYMENT_FAILED,
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Refunded => {
                return Ok(payment);
            }
        };

        let snapshot = self
            .order_snapshot(payment.order_id, payment.status == PaymentStatus::Success)
            .await;
        match snapshot {
            Some(order) => {
                let event = PaymentOutcomeEvent {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    seller_id: order.seller_id,
                    amount: payment.amount,
                    commission: order.commission,
                    currency: payment.currency.clone(),
                    status: payment.status,
                    gateway_id: payment.gateway_id.clone(),
                    failure_reason: payment.failure_reason.clone(),
                };
                if !self.bus.publish(routing_key, &event).await {
                    tracing::warn!(payment_id = %payment.id, routing_key, "payment outcome event not published");
                }
            }
            None => {
                tracing::error!(
                    payment_id = %payment.id,
                    order_id = %payment.order_id,
                    routing_key,
                    "order unavailable, payment outcome event not published"
                );
            }
        }

        Ok(payment)
    }

    /// Returns the payment for an order.
    pub async fn get_by_order(&self, order_id: OrderId) -> Result<Payment> {
        self.repository
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(order_id.to_string()))
    }

    /// Returns the audit log of a payment.
    pub async fn logs(&self, payment_id: PaymentId) -> Result<Vec<PaymentLog>> {
        self.repository.logs(payment_id).await
    }

    fn authenticate(&self, raw_body: &[u8], signature: Option<&str>) -> Result<()> {
        let Some(secret) = &self.webhook_secret else {
            tracing::warn!("accepting unsigned webhook, no secret configured");
            return Ok(());
        };
        let signature = signature.ok_or(PaymentError::Authentication("missing signature"))?;
        signature::verify(secret, raw_body, signature).map_err(PaymentError::Authentication)
    }

    /// Fetches the order for an outcome event, advancing it to PAID first
    /// when the payment succeeded. Failures are logged and left for
    /// reconciliation.
    async fn order_snapshot(&self, order_id: OrderId, mark_paid: bool) -> Option<OrderSnapshot> {
        if mark_paid {
            match self.orders.mark_paid(order_id, "Payment captured").await {
                Ok(order) => return Some(order),
                Err(e) => {
                    tracing::warn!(%order_id, error = %e, "could not mark order as paid");
                }
            }
        }

        match self.orders.get_order(order_id).await {
            Ok(order) => Some(order),
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "could not load order");
                None
            }
        }
    }
}
