//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ledger::LedgerError;
use orders::OrderError;
use payments::PaymentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path or body.
    BadRequest(String),
    Order(OrderError),
    Payment(PaymentError),
    Ledger(LedgerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
            ApiError::Ledger(err) => ledger_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn internal(err: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!(error = %err, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn order_error_to_response(err: OrderError) -> (StatusCode, String) {
    match &err {
        OrderError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        OrderError::InvalidTransition { .. } | OrderError::Conflict { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        OrderError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        OrderError::Upstream(_) => {
            tracing::warn!(error = %err, "pricing collaborator failed");
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        OrderError::Database(_) => internal(err),
    }
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String) {
    match &err {
        PaymentError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        PaymentError::Conflict(_) => (StatusCode::CONFLICT, err.to_string()),
        PaymentError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        // Never tell the caller which part of the signature check failed.
        PaymentError::Authentication(_) => {
            (StatusCode::BAD_REQUEST, "Invalid webhook".to_string())
        }
        PaymentError::Upstream(_) => {
            tracing::warn!(error = %err, "payment collaborator failed");
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        PaymentError::Database(_) | PaymentError::Serialization(_) => internal(err),
    }
}

fn ledger_error_to_response(err: LedgerError) -> (StatusCode, String) {
    match &err {
        LedgerError::Validation(_) | LedgerError::InsufficientBalance { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        LedgerError::InvalidPayoutTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        LedgerError::Database(_) | LedgerError::Serialization(_) => internal(err),
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}
