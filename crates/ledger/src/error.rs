//! Ledger error types.

use common::Money;
use thiserror::Error;

use crate::PayoutStatus;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The request or event was rejected before anything was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wallet or payout request not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A payout exceeds the available balance.
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Money, available: Money },

    /// The payout request has already been decided.
    #[error("Payout request is {from}, cannot move to {to}")]
    InvalidPayoutTransition { from: PayoutStatus, to: PayoutStatus },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;
