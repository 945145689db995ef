//! Broker-level message and delivery types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the dead-letter history of a message.
pub const X_DEATH: &str = "x-death";

/// Properties attached to a published message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    pub message_id: Uuid,
    pub content_type: String,
    /// Persistent messages survive a broker restart.
    pub persistent: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub headers: HashMap<String, serde_json::Value>,
}

impl MessageProperties {
    /// Properties for a persistent JSON message.
    pub fn persistent_json() -> Self {
        Self {
            message_id: Uuid::new_v4(),
            content_type: "application/json".to_string(),
            persistent: true,
            timestamp: Utc::now(),
            headers: HashMap::new(),
        }
    }
}

/// A message body with its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub body: Vec<u8>,
    pub properties: MessageProperties,
}

impl Message {
    pub fn new(body: Vec<u8>, properties: MessageProperties) -> Self {
        Self { body, properties }
    }

    /// Returns the most recent dead-letter record, if the message was dead-lettered.
    pub fn death_record(&self) -> Option<DeathRecord> {
        self.properties
            .headers
            .get(X_DEATH)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Records that the message was rejected from `queue`.
    ///
    /// The count accumulates across repeated dead-lettering of the same message.
    pub fn record_death(&mut self, queue: &str, exchange: &str, routing_key: &str, reason: &str) {
        let count = self.death_record().map(|r| r.count).unwrap_or(0) + 1;
        let record = DeathRecord {
            queue: queue.to_string(),
            reason: reason.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            count,
            time: Utc::now(),
        };
        if let Ok(value) = serde_json::to_value(record) {
            self.properties.headers.insert(X_DEATH.to_string(), value);
        }
    }
}

/// Dead-letter history of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathRecord {
    /// Queue the message was rejected from.
    pub queue: String,
    /// Why the message was dead-lettered (`rejected`).
    pub reason: String,
    /// Exchange the message was originally published to.
    pub exchange: String,
    /// Routing key the message was originally published with.
    pub routing_key: String,
    pub count: u32,
    pub time: DateTime<Utc>,
}

/// A message handed to a consumer, pending acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-assigned tag used to ack or nack this delivery.
    pub delivery_tag: u64,
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    /// True if this message was delivered before and not acknowledged.
    pub redelivered: bool,
    pub message: Message,
}

/// Arguments of a declared queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    pub durable: bool,
    /// Exchange that rejected messages are republished to
    /// (`x-dead-letter-exchange`).
    pub dead_letter_exchange: Option<String>,
    /// Routing key used when dead-lettering (`x-dead-letter-routing-key`).
    /// Falls back to the message's original routing key.
    pub dead_letter_routing_key: Option<String>,
}

impl QueueOptions {
    pub fn durable() -> Self {
        Self {
            durable: true,
            ..Self::default()
        }
    }

    pub fn with_dead_letter(
        mut self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self.dead_letter_routing_key = Some(routing_key.into());
        self
    }
}
