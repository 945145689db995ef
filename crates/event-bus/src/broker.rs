use async_trait::async_trait;

use crate::{Delivery, Message, QueueOptions, Result};

/// Core trait for message broker implementations.
///
/// Mirrors the subset of AMQP the services rely on: topic exchanges,
/// durable queues with dead-letter arguments, bindings, persistent publish
/// and explicit acknowledgement. All implementations must be thread-safe.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares a topic exchange. Declaring an existing exchange is a no-op.
    async fn declare_exchange(&self, name: &str) -> Result<()>;

    /// Declares a queue.
    ///
    /// Re-declaring with identical options is a no-op; different options fail
    /// with `PreconditionFailed`.
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()>;

    /// Binds a queue to an exchange with a topic binding key.
    async fn bind_queue(&self, queue: &str, exchange: &str, binding_key: &str) -> Result<()>;

    /// Publishes a message, copying it to every queue whose binding matches.
    ///
    /// Returns the number of queues the message was routed to.
    async fn publish(&self, exchange: &str, routing_key: &str, message: Message) -> Result<usize>;

    /// Appends a message straight to one queue, bypassing bindings.
    ///
    /// `exchange` and `routing_key` are recorded on the delivery as if the
    /// message had been routed there.
    async fn enqueue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        message: Message,
    ) -> Result<()>;

    /// Takes the next ready message from a queue without waiting.
    ///
    /// The message stays unacknowledged until `ack` or `nack` is called.
    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>>;

    /// Acknowledges a delivery, removing the message for good.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Rejects a delivery.
    ///
    /// With `requeue` the message goes back to the head of its queue;
    /// without it the message is dead-lettered if the queue has a
    /// dead-letter exchange, and dropped otherwise.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;

    /// Returns every unacknowledged delivery of a queue to the ready state.
    ///
    /// Called when a consumer starts so messages held by a crashed consumer
    /// are redelivered. Returns the number of recovered messages.
    async fn recover(&self, queue: &str) -> Result<u64>;

    /// Number of ready messages in a queue.
    async fn queue_depth(&self, queue: &str) -> Result<u64>;
}
