//! Payment error types.

use thiserror::Error;

/// Errors that can occur while creating payments or ingesting webhooks.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The request was rejected before anything was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No payment exists for the order.
    #[error("Payment not found: {0}")]
    NotFound(String),

    /// A payment already exists for the order.
    #[error("Payment already exists for order {0}")]
    Conflict(String),

    /// Webhook signature missing or wrong. The message is kept out of
    /// responses.
    #[error("Authentication failed: {0}")]
    Authentication(&'static str),

    /// The payment gateway or the order service failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
