//! Client for the order lifecycle service.

use std::time::Duration;

use async_trait::async_trait;
use common::{Currency, Money, OrderId, SellerId};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{PaymentError, Result};

/// The parts of an order that payment events carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub id: OrderId,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub seller_id: Option<SellerId>,
    pub total_amount: Money,
    #[serde(default)]
    pub commission: Money,
    #[serde(default)]
    pub currency: Currency,
    pub status: String,
}

/// Synchronous calls into the order service.
#[async_trait]
pub trait OrderClient: Send + Sync {
    /// Advances the order to PAID and returns the updated order.
    async fn mark_paid(&self, order_id: OrderId, notes: &str) -> Result<OrderSnapshot>;

    async fn get_order(&self, order_id: OrderId) -> Result<OrderSnapshot>;
}

/// Order client over HTTP (`PATCH /orders/:id/status`, `GET /orders/:id`).
#[derive(Debug, Clone)]
pub struct HttpOrderClient {
    client: Client,
    base_url: String,
}

impl HttpOrderClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, order_id: OrderId, suffix: &str) -> String {
        format!(
            "{}/orders/{}{}",
            self.base_url.trim_end_matches('/'),
            order_id,
            suffix
        )
    }

    async fn handle_response(response: reqwest::Response) -> Result<OrderSnapshot> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PaymentError::Upstream(format!(
                "order service returned {status}: {text}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PaymentError::Upstream(format!("invalid order response: {e}")))
    }
}

#[async_trait]
impl OrderClient for HttpOrderClient {
    #[tracing::instrument(skip(self))]
    async fn mark_paid(&self, order_id: OrderId, notes: &str) -> Result<OrderSnapshot> {
        let response = self
            .client
            .patch(self.url(order_id, "/status"))
            .json(&serde_json::json!({"status": "PAID", "notes": notes}))
            .send()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;
        Self::handle_response(response).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_order(&self, order_id: OrderId) -> Result<OrderSnapshot> {
        let response = self
            .client
            .get(self.url(order_id, ""))
            .send()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;
        Self::handle_response(response).await
    }
}
