use thiserror::Error;

/// Errors raised by the event bus and its broker implementations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Publishing to an exchange that was never declared.
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    /// Consuming from or binding a queue that was never declared.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// A queue was re-declared with arguments that differ from the existing one.
    #[error("Queue {queue} already declared with different arguments")]
    PreconditionFailed { queue: String },

    /// Acknowledging a delivery the broker no longer tracks.
    #[error("Unknown delivery tag {delivery_tag} on queue {queue}")]
    UnknownDelivery { queue: String, delivery_tag: u64 },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
