//! Payment intents and gateway webhook ingestion.
//!
//! [`PaymentService`] records one payment per order, opens gateway orders
//! idempotently and turns signed gateway webhooks into payment status
//! updates and `payment.success` / `payment.failed` events.

pub mod error;
pub mod gateway;
pub mod model;
pub mod order_client;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod signature;
pub mod status;
pub mod webhook;

pub use error::{PaymentError, Result};
pub use gateway::{
    GatewayOrder, GatewayOrderRequest, HttpPaymentGateway, InMemoryPaymentGateway, PaymentGateway,
};
pub use model::{CreatePayment, Payment, PaymentLog, PaymentOutcomeEvent};
pub use order_client::{HttpOrderClient, OrderClient, OrderSnapshot};
pub use postgres::PostgresPaymentRepository;
pub use repository::{InMemoryPaymentRepository, PaymentRepository};
pub use service::{CreateGatewayOrder, GatewayCheckout, PaymentService};
pub use status::{PaymentStatus, map_gateway_status};
pub use webhook::{WebhookNotice, WebhookPayload};
