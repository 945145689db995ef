use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    BusError, Delivery, Message, QueueOptions, Result, broker::Broker, routing::topic_matches,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    exchange: String,
    routing_key: String,
    message: Message,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    options: QueueOptions,
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
}

#[derive(Debug)]
struct Binding {
    queue: String,
    exchange: String,
    binding_key: String,
}

#[derive(Debug, Default)]
struct BrokerState {
    exchanges: HashSet<String>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    next_delivery_tag: u64,
}

impl BrokerState {
    fn route(&mut self, exchange: &str, routing_key: &str, message: Message) -> Result<usize> {
        if !self.exchanges.contains(exchange) {
            return Err(BusError::ExchangeNotFound(exchange.to_string()));
        }

        let targets: Vec<String> = self
            .bindings
            .iter()
            .filter(|b| b.exchange == exchange && topic_matches(&b.binding_key, routing_key))
            .map(|b| b.queue.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        for queue in &targets {
            if let Some(state) = self.queues.get_mut(queue) {
                state.ready.push_back(StoredMessage {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    message: message.clone(),
                    redelivered: false,
                });
            }
        }

        Ok(targets.len())
    }

    fn queue_mut(&mut self, queue: &str) -> Result<&mut QueueState> {
        self.queues
            .get_mut(queue)
            .ok_or_else(|| BusError::QueueNotFound(queue.to_string()))
    }

    fn take_unacked(&mut self, delivery: &Delivery) -> Result<StoredMessage> {
        self.queue_mut(&delivery.queue)?
            .unacked
            .remove(&delivery.delivery_tag)
            .ok_or_else(|| BusError::UnknownDelivery {
                queue: delivery.queue.clone(),
                delivery_tag: delivery.delivery_tag,
            })
    }
}

/// In-memory broker for tests and single-process deployments.
///
/// Implements the same routing, acknowledgement and dead-letter semantics
/// as the PostgreSQL broker, without durability across restarts.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of unacknowledged deliveries on a queue.
    pub async fn unacked_count(&self, queue: &str) -> usize {
        self.state
            .read()
            .await
            .queues
            .get(queue)
            .map(|q| q.unacked.len())
            .unwrap_or(0)
    }

    /// Returns copies of the ready messages on a queue, oldest first.
    pub async fn peek(&self, queue: &str) -> Vec<Message> {
        self.state
            .read()
            .await
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|m| m.message.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_exchange(&self, name: &str) -> Result<()> {
        self.state.write().await.exchanges.insert(name.to_string());
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<()> {
        let mut state = self.state.write().await;
        match state.queues.get(name) {
            Some(existing) if existing.options != options => Err(BusError::PreconditionFailed {
                queue: name.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                state.queues.insert(
                    name.to_string(),
                    QueueState {
                        options,
                        ..QueueState::default()
                    },
                );
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, binding_key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.queues.contains_key(queue) {
            return Err(BusError::QueueNotFound(queue.to_string()));
        }
        if !state.exchanges.contains(exchange) {
            return Err(BusError::ExchangeNotFound(exchange.to_string()));
        }

        let exists = state.bindings.iter().any(|b| {
            b.queue == queue && b.exchange == exchange && b.binding_key == binding_key
        });
        if !exists {
            state.bindings.push(Binding {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                binding_key: binding_key.to_string(),
            });
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, message: Message) -> Result<usize> {
        self.state
            .write()
            .await
            .route(exchange, routing_key, message)
    }

    async fn enqueue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        message: Message,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.queue_mut(queue)?.ready.push_back(StoredMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            message,
            redelivered: false,
        });
        Ok(())
    }

    async fn fetch(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut state = self.state.write().await;
        state.next_delivery_tag += 1;
        let delivery_tag = state.next_delivery_tag;

        let queue_state = state.queue_mut(queue)?;
        let Some(stored) = queue_state.ready.pop_front() else {
            return Ok(None);
        };

        let delivery = Delivery {
            delivery_tag,
            queue: queue.to_string(),
            exchange: stored.exchange.clone(),
            routing_key: stored.routing_key.clone(),
            redelivered: stored.redelivered,
            message: stored.message.clone(),
        };
        queue_state.unacked.insert(delivery_tag, stored);

        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.write().await;
        state.take_unacked(delivery)?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let mut stored = state.take_unacked(delivery)?;

        if requeue {
            stored.redelivered = true;
            state.queue_mut(&delivery.queue)?.ready.push_front(stored);
            return Ok(());
        }

        let options = state.queue_mut(&delivery.queue)?.options.clone();
        let Some(dlx) = options.dead_letter_exchange else {
            tracing::warn!(
                queue = %delivery.queue,
                routing_key = %delivery.routing_key,
                "rejected message dropped, queue has no dead-letter exchange"
            );
            return Ok(());
        };

        let dl_routing_key = options
            .dead_letter_routing_key
            .unwrap_or_else(|| stored.routing_key.clone());
        stored.message.record_death(
            &delivery.queue,
            &stored.exchange,
            &stored.routing_key,
            "rejected",
        );
        state.route(&dlx, &dl_routing_key, stored.message)?;
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        let queue_state = state.queue_mut(queue)?;

        let mut recovered: Vec<(u64, StoredMessage)> = queue_state.unacked.drain().collect();
        recovered.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
        let count = recovered.len() as u64;
        for (_, mut stored) in recovered {
            stored.redelivered = true;
            queue_state.ready.push_front(stored);
        }
        Ok(count)
    }

    async fn queue_depth(&self, queue: &str) -> Result<u64> {
        let state = self.state.read().await;
        state
            .queues
            .get(queue)
            .map(|q| q.ready.len() as u64)
            .ok_or_else(|| BusError::QueueNotFound(queue.to_string()))
    }
}
