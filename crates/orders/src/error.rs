//! Order error types.

use common::OrderId;
use thiserror::Error;

use crate::OrderStatus;

/// Errors that can occur in the order lifecycle.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request was rejected before anything was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested status change is not in the transition table.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// No order exists with the given id.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The order changed status concurrently.
    #[error("Order {order_id} is no longer {expected}")]
    Conflict {
        order_id: OrderId,
        expected: OrderStatus,
    },

    /// The pricing collaborator failed or answered with a non-2xx status.
    #[error("Pricing service error: {0}")]
    Upstream(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl OrderError {
    /// Returns true if the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OrderError::Validation(_)
                | OrderError::InvalidTransition { .. }
                | OrderError::NotFound(_)
                | OrderError::Conflict { .. }
        )
    }
}

/// Convenience type alias for order results.
pub type Result<T> = std::result::Result<T, OrderError>;
