//! Order lifecycle manager.
//!
//! Owns order creation, the status state machine and the lifecycle events
//! published on each transition:
//!
//! - [`OrderService`]: create, update status, read
//! - [`OrderRepository`]: in-memory and PostgreSQL storage
//! - [`PricingClient`]: the synchronous pricing collaborator

pub mod error;
pub mod model;
pub mod postgres;
pub mod pricing;
pub mod repository;
pub mod service;
pub mod status;

pub use error::{OrderError, Result};
pub use model::{
    CreateOrder, CreateOrderItem, Order, OrderCreatedEvent, OrderItem, OrderStatusEvent,
    OrderStatusLog,
};
pub use postgres::PostgresOrderRepository;
pub use pricing::{
    HttpPricingClient, MarginCheck, MarginRequest, PricedItem, PricingClient, PricingItem,
    PricingRequest, PricingSummary, Quote, StaticPricingClient,
};
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use service::OrderService;
pub use status::OrderStatus;
