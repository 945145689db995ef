//! Payment and gateway webhook endpoints.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{OrderId, PaymentId};
use payments::{CreateGatewayOrder, CreatePayment, GatewayCheckout, Payment, PaymentLog};
use serde::Serialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

/// Header carrying `hex(HMAC-SHA256(secret, body))`.
pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub payment_id: PaymentId,
    pub status: payments::PaymentStatus,
}

/// POST /payments — record a pending payment for an order.
#[tracing::instrument(skip(state, request))]
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreatePayment>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let payment = state.payments.create(request).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// POST /payments/gateway-order — open (or return) the gateway order.
#[tracing::instrument(skip(state, request))]
pub async fn create_gateway_order(
    State(state): State<AppState>,
    Json(request): Json<CreateGatewayOrder>,
) -> Result<(StatusCode, Json<GatewayCheckout>), ApiError> {
    let checkout = state.payments.create_gateway_order(request).await?;
    Ok((StatusCode::CREATED, Json(checkout)))
}

/// POST /payments/webhook — signed gateway notification.
///
/// The body is taken raw; the signature covers its exact bytes.
#[tracing::instrument(skip_all)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let payment = state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookAck {
        received: true,
        payment_id: payment.id,
        status: payment.status,
    }))
}

/// GET /payments/order/{order_id}
pub async fn get_by_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    let order_id = parse_id(&order_id, "order id", OrderId::parse)?;
    Ok(Json(state.payments.get_by_order(order_id).await?))
}

/// GET /payments/{id}/logs — audit trail of a payment.
pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaymentLog>>, ApiError> {
    let id = parse_id(&id, "payment id", PaymentId::parse)?;
    Ok(Json(state.payments.logs(id).await?))
}
