use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::routing::event_name;

/// Wire envelope for every lifecycle event.
///
/// ```json
/// {"event": "ORDER_DELIVERED", "timestamp": "2024-01-01T00:00:00Z", "data": {...}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event name derived from the routing key.
    pub event: String,

    /// When the event was published.
    pub timestamp: DateTime<Utc>,

    /// The event payload.
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Wraps a payload for the given routing key.
    pub fn new<T: Serialize + ?Sized>(
        routing_key: &str,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event_name(routing_key),
            timestamp: Utc::now(),
            data: serde_json::to_value(payload)?,
        })
    }

    /// Deserializes the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
