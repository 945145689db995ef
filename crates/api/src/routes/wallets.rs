//! Wallet and payout endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, PayoutId, SellerId};
use ledger::{PayoutRequest, PayoutStatus, Reconciliation, Wallet, WalletTransaction};
use serde::Deserialize;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayoutRequest {
    pub amount: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayoutRequest {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn seller(raw: &str) -> Result<SellerId, ApiError> {
    parse_id(raw, "seller id", SellerId::parse)
}

/// GET /wallets/{seller_id}
pub async fn get(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
) -> Result<Json<Wallet>, ApiError> {
    Ok(Json(state.ledger.get_wallet(seller(&seller_id)?).await?))
}

/// GET /wallets/{seller_id}/transactions
pub async fn transactions(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
) -> Result<Json<Vec<WalletTransaction>>, ApiError> {
    Ok(Json(state.ledger.transactions(seller(&seller_id)?).await?))
}

/// GET /wallets/{seller_id}/payouts
pub async fn payouts(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
) -> Result<Json<Vec<PayoutRequest>>, ApiError> {
    Ok(Json(state.ledger.payout_requests(seller(&seller_id)?).await?))
}

/// GET /wallets/{seller_id}/reconciliation
pub async fn reconcile(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
) -> Result<Json<Reconciliation>, ApiError> {
    Ok(Json(state.ledger.reconcile(seller(&seller_id)?).await?))
}

/// POST /wallets/{seller_id}/payouts — request a withdrawal.
#[tracing::instrument(skip(state, request))]
pub async fn create_payout(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
    Json(request): Json<CreatePayoutRequest>,
) -> Result<(StatusCode, Json<PayoutRequest>), ApiError> {
    let payout = state
        .ledger
        .create_payout_request(seller(&seller_id)?, request.amount, request.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(payout)))
}

/// PATCH /payouts/{id} — approve (`PROCESSED`) or reject a payout.
#[tracing::instrument(skip(state, request))]
pub async fn update_payout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdatePayoutRequest>,
) -> Result<Json<PayoutRequest>, ApiError> {
    let id = parse_id(&id, "payout id", PayoutId::parse)?;
    let status: PayoutStatus = request.status.parse().map_err(ApiError::BadRequest)?;
    Ok(Json(
        state
            .ledger
            .update_payout_status(id, status, request.notes)
            .await?,
    ))
}
