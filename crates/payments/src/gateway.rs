//! Payment gateway client.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{PaymentError, Result};

/// Body of a gateway order creation. Amounts are in minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: HashMap<String, String>,
}

/// An order on the gateway side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder>;

    async fn fetch_order(&self, gateway_id: &str) -> Result<GatewayOrder>;
}

/// Gateway client over the gateway's REST API (`/v1/orders`), using HTTP
/// basic auth with the key id and secret.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn handle_response(response: reqwest::Response) -> Result<GatewayOrder> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PaymentError::Upstream(format!("gateway returned {status}: {text}")));
        }
        response
            .json()
            .await
            .map_err(|e| PaymentError::Upstream(format!("invalid gateway response: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self, request), fields(receipt = %request.receipt))]
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder> {
        let response = self
            .client
            .post(self.url("v1/orders"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;
        Self::handle_response(response).await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_order(&self, gateway_id: &str) -> Result<GatewayOrder> {
        let response = self
            .client
            .get(self.url(&format!("v1/orders/{gateway_id}")))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;
        Self::handle_response(response).await
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    orders: HashMap<String, GatewayOrder>,
    next_id: u32,
    created: u32,
    fail_on_create: bool,
}

/// In-memory gateway for development and testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail on order creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_on_create = fail;
        }
    }

    /// Number of gateway orders created so far.
    pub fn created_count(&self) -> u32 {
        self.state.read().map(|s| s.created).unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder> {
        let mut state = self
            .state
            .write()
            .map_err(|_| PaymentError::Upstream("gateway state poisoned".to_string()))?;

        if state.fail_on_create {
            return Err(PaymentError::Upstream("gateway declined order".to_string()));
        }

        state.next_id += 1;
        state.created += 1;
        let order = GatewayOrder {
            id: format!("order_{:06}", state.next_id),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".to_string()),
            notes: serde_json::to_value(&request.notes)?,
        };
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, gateway_id: &str) -> Result<GatewayOrder> {
        self.state
            .read()
            .map_err(|_| PaymentError::Upstream("gateway state poisoned".to_string()))?
            .orders
            .get(gateway_id)
            .cloned()
            .ok_or_else(|| PaymentError::Upstream(format!("unknown gateway order {gateway_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GatewayOrderRequest {
        GatewayOrderRequest {
            amount: 100_000,
            currency: "INR".to_string(),
            receipt: "ORD-1".to_string(),
            notes: HashMap::from([("orderId".to_string(), "o-1".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let gateway = InMemoryPaymentGateway::new();
        let order = gateway.create_order(&request()).await.unwrap();

        assert_eq!(order.notes["orderId"], "o-1");
        assert_eq!(gateway.fetch_order(&order.id).await.unwrap(), order);
        assert_eq!(gateway.created_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_create(true);
        assert!(matches!(
            gateway.create_order(&request()).await,
            Err(PaymentError::Upstream(_))
        ));
        assert_eq!(gateway.created_count(), 0);
    }
}
