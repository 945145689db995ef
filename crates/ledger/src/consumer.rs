//! Lifecycle event consumer feeding the ledger.

use async_trait::async_trait;
use event_bus::{EventEnvelope, HandlerResult, MessageHandler, Topology, keys};

use crate::{CommissionEvent, LedgerService};

/// Routing keys the ledger queue is bound to.
pub const LEDGER_BINDINGS: [&str; 3] = [
    keys::PAYMENT_SUCCESS,
    keys::ORDER_DELIVERED,
    keys::ORDER_CANCELLED,
];

/// Topology of the ledger's consuming queue.
pub fn topology(exchange: &str, queue: &str) -> Topology {
    LEDGER_BINDINGS
        .iter()
        .fold(Topology::new(exchange, queue), |topology, key| topology.bind(*key))
}

/// Applies `payment.success`, `order.delivered` and `order.cancelled`
/// events to seller wallets.
///
/// A handler error leaves the wallet untouched and sends the message to the
/// dead-letter queue.
#[derive(Clone)]
pub struct LedgerConsumer {
    service: LedgerService,
}

impl LedgerConsumer {
    pub fn new(service: LedgerService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for LedgerConsumer {
    #[tracing::instrument(skip(self, envelope), fields(event = %envelope.event))]
    async fn handle(&self, routing_key: &str, envelope: &EventEnvelope) -> HandlerResult {
        if !LEDGER_BINDINGS.iter().any(|key| *key == routing_key) {
            tracing::warn!(routing_key, "unexpected routing key, acknowledging");
            return Ok(());
        }

        let event: CommissionEvent = envelope.decode()?;
        let Some(seller_id) = event.seller_id else {
            tracing::debug!(order_id = %event.order_id, "order has no seller, skipping");
            return Ok(());
        };
        if event.commission.is_zero() {
            tracing::debug!(order_id = %event.order_id, "no commission, skipping");
            return Ok(());
        }

        let (order_id, commission) = (event.order_id, event.commission);
        match routing_key {
            keys::PAYMENT_SUCCESS => {
                self.service
                    .on_payment_success(seller_id, order_id, commission)
                    .await?
            }
            keys::ORDER_DELIVERED => {
                self.service
                    .on_order_delivered(seller_id, order_id, commission)
                    .await?
            }
            _ => {
                self.service
                    .on_order_cancelled(seller_id, order_id, commission)
                    .await?
            }
        };
        Ok(())
    }
}
