//! Order endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, UserId};
use orders::{CreateOrder, Order, OrderStatus, OrderStatusLog};
use serde::Deserialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub user_id: String,
}

/// POST /orders — price and place an order.
#[tracing::instrument(skip(state, request))]
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.orders.create(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders?userId= — list a user's orders.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let user_id = parse_id(&query.user_id, "user id", UserId::parse)?;
    Ok(Json(state.orders.list_by_user(user_id).await?))
}

/// GET /orders/{id}
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let id = parse_id(&id, "order id", OrderId::parse)?;
    Ok(Json(state.orders.get(id).await?))
}

/// PATCH /orders/{id}/status — move the order through its state machine.
#[tracing::instrument(skip(state, request))]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let id = parse_id(&id, "order id", OrderId::parse)?;
    let status: OrderStatus = request.status.parse().map_err(ApiError::BadRequest)?;
    Ok(Json(state.orders.update_status(id, status, request.notes).await?))
}

/// GET /orders/{id}/history — status log, oldest first.
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderStatusLog>>, ApiError> {
    let id = parse_id(&id, "order id", OrderId::parse)?;
    Ok(Json(state.orders.status_history(id).await?))
}
