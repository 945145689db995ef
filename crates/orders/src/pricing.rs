//! Pricing collaborator: price and commission computation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, ProductId, SellerId};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::{OrderError, Result};

/// An item sent for pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingItem {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selling_price: Option<Money>,
}

/// Body of `POST /pricing/calculate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingRequest {
    pub items: Vec<PricingItem>,
    pub seller_id: Option<SellerId>,
}

/// An item priced by the pricing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    #[serde(default)]
    pub commission: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingSummary {
    pub total_amount: Money,
    pub total_commission: Money,
}

/// Response of `POST /pricing/calculate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub items: Vec<PricedItem>,
    pub summary: PricingSummary,
}

/// Body of `POST /pricing/validate-margin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginRequest {
    pub product_id: ProductId,
    pub selling_price: Money,
    pub seller_id: Option<SellerId>,
}

/// Response of `POST /pricing/validate-margin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginCheck {
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Synchronous pricing collaborator.
///
/// Any error is returned as [`OrderError::Upstream`] so the order is not
/// created.
#[async_trait]
pub trait PricingClient: Send + Sync {
    async fn calculate(&self, request: &PricingRequest) -> Result<Quote>;

    async fn validate_margin(&self, request: &MarginRequest) -> Result<MarginCheck>;
}

/// Pricing client talking to the pricing service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPricingClient {
    client: Client,
    base_url: String,
}

impl HttpPricingClient {
    /// Creates a client with a bounded per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrderError::Upstream(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| OrderError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrderError::Upstream(format!("{path} returned {status}: {text}")));
        }

        response
            .json()
            .await
            .map_err(|e| OrderError::Upstream(format!("{path} returned an invalid body: {e}")))
    }
}

#[async_trait]
impl PricingClient for HttpPricingClient {
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    async fn calculate(&self, request: &PricingRequest) -> Result<Quote> {
        self.post("pricing/calculate", request).await
    }

    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id))]
    async fn validate_margin(&self, request: &MarginRequest) -> Result<MarginCheck> {
        self.post("pricing/validate-margin", request).await
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    base_price: Money,
    /// Commission per unit when sold at the base price.
    commission: Money,
}

#[derive(Debug, Default)]
struct StaticPricingState {
    catalog: HashMap<ProductId, CatalogEntry>,
    fail: bool,
}

/// Price list held in memory, for development and testing.
///
/// A reseller's selling price is valid when it is at least the base price;
/// the markup above the base price is added to the commission.
#[derive(Debug, Clone, Default)]
pub struct StaticPricingClient {
    state: Arc<RwLock<StaticPricingState>>,
}

impl StaticPricingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product with its base price and per-unit commission.
    pub fn with_product(
        self,
        product_id: impl Into<ProductId>,
        base_price: Money,
        commission: Money,
    ) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.catalog.insert(
                product_id.into(),
                CatalogEntry {
                    base_price,
                    commission,
                },
            );
        }
        self
    }

    /// Makes every subsequent call fail as if the service were down.
    pub fn set_unavailable(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail = fail;
        }
    }

    fn entry(&self, product_id: &ProductId) -> Result<CatalogEntry> {
        let state = self
            .state
            .read()
            .map_err(|_| OrderError::Upstream("pricing state poisoned".to_string()))?;
        if state.fail {
            return Err(OrderError::Upstream("pricing service unavailable".to_string()));
        }
        state
            .catalog
            .get(product_id)
            .cloned()
            .ok_or_else(|| OrderError::Upstream(format!("unknown product {product_id}")))
    }
}

#[async_trait]
impl PricingClient for StaticPricingClient {
    async fn calculate(&self, request: &PricingRequest) -> Result<Quote> {
        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let entry = self.entry(&item.product_id)?;
            let unit_price = item.selling_price.unwrap_or(entry.base_price);
            let markup = (unit_price - entry.base_price).floor_zero();
            let unit_commission = if request.seller_id.is_some() {
                entry.commission + markup
            } else {
                Money::zero()
            };

            items.push(PricedItem {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price,
                total_price: unit_price.multiply(item.quantity),
                commission: unit_commission.multiply(item.quantity),
            });
        }

        let summary = PricingSummary {
            total_amount: items.iter().map(|i| i.total_price).sum(),
            total_commission: items.iter().map(|i| i.commission).sum(),
        };
        Ok(Quote { items, summary })
    }

    async fn validate_margin(&self, request: &MarginRequest) -> Result<MarginCheck> {
        let entry = self.entry(&request.product_id)?;
        if request.selling_price < entry.base_price {
            return Ok(MarginCheck {
                valid: false,
                message: Some(format!(
                    "selling price {} is below base price {}",
                    request.selling_price, entry.base_price
                )),
            });
        }
        Ok(MarginCheck {
            valid: true,
            message: None,
        })
    }
}
