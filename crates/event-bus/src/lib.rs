//! Event bus adapter over a durable, topic-routed message broker.
//!
//! Services publish lifecycle events to a topic exchange and consume them
//! from their own durable queue. Consumption is at-least-once: a message is
//! acknowledged only after its handler returned successfully, and a failed
//! message is rejected without requeue so the broker moves it to the
//! queue's dead-letter queue.

pub mod broker;
pub mod bus;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod message;
pub mod postgres;
pub mod routing;
pub mod topology;

pub use broker::Broker;
pub use bus::{ConsumeOutcome, DrainStats, EventBus, HandlerResult, MessageHandler};
pub use envelope::EventEnvelope;
pub use error::{BusError, Result};
pub use memory::InMemoryBroker;
pub use message::{DeathRecord, Delivery, Message, MessageProperties, QueueOptions};
pub use postgres::PostgresBroker;
pub use routing::{event_name, keys, topic_matches};
pub use topology::Topology;
