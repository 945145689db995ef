use crate::{Broker, QueueOptions, Result};

/// Exchange, queue, dead-letter queue and bindings owned by one consumer.
///
/// Every service declares its own topology on startup. Declaration is
/// idempotent, so several processes may declare the same topology.
#[derive(Debug, Clone)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub binding_keys: Vec<String>,
}

impl Topology {
    pub fn new(exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            binding_keys: Vec::new(),
        }
    }

    /// Adds a binding key for the consuming queue.
    pub fn bind(mut self, binding_key: impl Into<String>) -> Self {
        self.binding_keys.push(binding_key.into());
        self
    }

    /// Name of the dead-letter exchange paired with the main exchange.
    pub fn dead_letter_exchange(&self) -> String {
        format!("{}.dlx", self.exchange)
    }

    /// Name of the consuming queue's dead-letter queue.
    pub fn dead_letter_queue(&self) -> String {
        format!("{}.dlq", self.queue)
    }

    /// Declares the whole topology on a broker.
    #[tracing::instrument(skip(self, broker), fields(exchange = %self.exchange, queue = %self.queue))]
    pub async fn declare(&self, broker: &dyn Broker) -> Result<()> {
        let dlx = self.dead_letter_exchange();
        let dlq = self.dead_letter_queue();

        broker.declare_exchange(&self.exchange).await?;
        broker.declare_exchange(&dlx).await?;

        broker
            .declare_queue(
                &self.queue,
                QueueOptions::durable().with_dead_letter(dlx.clone(), self.queue.clone()),
            )
            .await?;
        broker.declare_queue(&dlq, QueueOptions::durable()).await?;
        broker.bind_queue(&dlq, &dlx, &self.queue).await?;

        for key in &self.binding_keys {
            broker.bind_queue(&self.queue, &self.exchange, key).await?;
        }

        tracing::info!(bindings = ?self.binding_keys, "topology declared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryBroker, Message, MessageProperties};

    #[tokio::test]
    async fn declare_is_idempotent() {
        let broker = InMemoryBroker::new();
        let topology = Topology::new("ecommerce.events", "ledger.events").bind("order.delivered");

        topology.declare(&broker).await.unwrap();
        topology.declare(&broker).await.unwrap();

        let routed = broker
            .publish(
                "ecommerce.events",
                "order.delivered",
                Message::new(b"{}".to_vec(), MessageProperties::persistent_json()),
            )
            .await
            .unwrap();
        assert_eq!(routed, 1);
    }

    #[test]
    fn dead_letter_names() {
        let topology = Topology::new("ecommerce.events", "ledger.events");
        assert_eq!(topology.dead_letter_exchange(), "ecommerce.events.dlx");
        assert_eq!(topology.dead_letter_queue(), "ledger.events.dlq");
    }
}
