//! Publish and consume API used by the services.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::watch;

use crate::{Broker, EventEnvelope, Message, MessageProperties, Result, Topology};

/// Result returned by message handlers.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Consumer-side business logic for one queue.
///
/// Returning `Ok` acknowledges the message, so a handler must only return
/// once its side effects are durably committed. Any error (or panic)
/// rejects the message to the dead-letter queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, routing_key: &str, envelope: &EventEnvelope) -> HandlerResult;
}

/// What happened to a consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Acked,
    DeadLettered,
}

/// Counters returned by [`EventBus::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub acked: u64,
    pub dead_lettered: u64,
}

/// Event bus bound to one topic exchange.
#[derive(Clone)]
pub struct EventBus {
    broker: Arc<dyn Broker>,
    exchange: String,
}

impl EventBus {
    pub fn new(broker: Arc<dyn Broker>, exchange: impl Into<String>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Declares a consumer topology on the underlying broker.
    pub async fn declare(&self, topology: &Topology) -> Result<()> {
        topology.declare(self.broker.as_ref()).await
    }

    /// Publishes a persistent event.
    ///
    /// Returns false if the broker refused the message. Failures are logged
    /// here; callers treat publication as best-effort.
    #[tracing::instrument(skip(self, payload), fields(exchange = %self.exchange))]
    pub async fn publish<T: Serialize + Sync + ?Sized>(
        &self,
        routing_key: &str,
        payload: &T,
    ) -> bool {
        match self.try_publish(routing_key, payload).await {
            Ok(routed) => {
                if routed == 0 {
                    tracing::debug!(routing_key, "no queue bound for routing key");
                }
                metrics::counter!("bus_messages_published_total").increment(1);
                true
            }
            Err(e) => {
                metrics::counter!("bus_publish_failures_total").increment(1);
                tracing::error!(routing_key, error = %e, "failed to publish event");
                false
            }
        }
    }

    async fn try_publish<T: Serialize + Sync + ?Sized>(
        &self,
        routing_key: &str,
        payload: &T,
    ) -> Result<usize> {
        let envelope = EventEnvelope::new(routing_key, payload)?;
        let message = Message::new(envelope.to_bytes()?, MessageProperties::persistent_json());
        self.broker.publish(&self.exchange, routing_key, message).await
    }

    /// Publishes several events concurrently.
    ///
    /// Each event succeeds or fails on its own; the result holds one flag
    /// per event, in input order.
    pub async fn publish_batch(&self, events: Vec<(String, serde_json::Value)>) -> Vec<bool> {
        join_all(
            events
                .iter()
                .map(|(routing_key, payload)| self.publish(routing_key, payload)),
        )
        .await
    }

    /// Handles the next ready message on a queue, if any.
    ///
    /// Returns `Ok(None)` when the queue is empty. An error means the broker
    /// could not be reached; the message then stays unacknowledged and is
    /// redelivered on recovery.
    pub async fn consume_one(
        &self,
        queue: &str,
        handler: &dyn MessageHandler,
    ) -> Result<Option<ConsumeOutcome>> {
        let Some(delivery) = self.broker.fetch(queue).await? else {
            return Ok(None);
        };

        let result = match EventEnvelope::from_bytes(&delivery.message.body) {
            Ok(envelope) => {
                AssertUnwindSafe(handler.handle(&delivery.routing_key, &envelope))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err("handler panicked".into()))
            }
            Err(e) => Err(format!("malformed envelope: {e}").into()),
        };

        match result {
            Ok(()) => {
                self.broker.ack(&delivery).await?;
                metrics::counter!("bus_messages_acked_total").increment(1);
                tracing::debug!(
                    queue,
                    routing_key = %delivery.routing_key,
                    redelivered = delivery.redelivered,
                    "message acknowledged"
                );
                Ok(Some(ConsumeOutcome::Acked))
            }
            Err(e) => {
                self.broker.nack(&delivery, false).await?;
                metrics::counter!("bus_messages_dead_lettered_total").increment(1);
                tracing::error!(
                    queue,
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "handler failed, message dead-lettered"
                );
                Ok(Some(ConsumeOutcome::DeadLettered))
            }
        }
    }

    /// Handles messages until the queue is empty.
    pub async fn drain(&self, queue: &str, handler: &dyn MessageHandler) -> Result<DrainStats> {
        let mut stats = DrainStats::default();
        while let Some(outcome) = self.consume_one(queue, handler).await? {
            match outcome {
                ConsumeOutcome::Acked => stats.acked += 1,
                ConsumeOutcome::DeadLettered => stats.dead_lettered += 1,
            }
        }
        Ok(stats)
    }

    /// Runs a single sequential consumer until `shutdown` flips to true.
    ///
    /// One message is fully handled and acknowledged before the next is
    /// fetched. Unacknowledged messages left by a previous consumer are
    /// recovered first.
    #[tracing::instrument(skip(self, handler, shutdown))]
    pub async fn run_consumer(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let recovered = self.broker.recover(queue).await?;
        if recovered > 0 {
            tracing::info!(recovered, "redelivering unacknowledged messages");
        }
        let backlog = self.broker.queue_depth(queue).await?;
        tracing::info!(backlog, "consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.consume_one(queue, handler.as_ref()).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "failed to consume from queue"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(poll_interval) => {}
            }
        }

        tracing::info!("consumer stopped");
        Ok(())
    }

    /// Moves every message of a topology's dead-letter queue back to the
    /// queue that rejected it, keeping its original exchange and routing key.
    /// Other queues bound to the same key do not see the message again.
    ///
    /// Returns the number of replayed messages.
    #[tracing::instrument(skip(self, topology), fields(queue = %topology.queue))]
    pub async fn replay_dead_letters(&self, topology: &Topology) -> Result<u64> {
        let dlq = topology.dead_letter_queue();
        let mut replayed = 0;

        while let Some(delivery) = self.broker.fetch(&dlq).await? {
            let (queue, exchange, routing_key) = match delivery.message.death_record() {
                Some(record) => (record.queue, record.exchange, record.routing_key),
                None => (
                    topology.queue.clone(),
                    self.exchange.clone(),
                    delivery.routing_key.clone(),
                ),
            };
            self.broker
                .enqueue(&queue, &exchange, &routing_key, delivery.message.clone())
                .await?;
            self.broker.ack(&delivery).await?;
            replayed += 1;
        }

        if replayed > 0 {
            tracing::info!(replayed, "dead-lettered messages replayed");
        }
        Ok(replayed)
    }
}
