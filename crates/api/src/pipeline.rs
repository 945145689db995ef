//! Wiring of stores, broker, collaborators and services into one process.

use std::sync::Arc;

use event_bus::{Broker, BusError, EventBus, InMemoryBroker, PostgresBroker, Topology};
use ledger::{InMemoryLedgerStore, LedgerConsumer, LedgerService, LedgerStore, PostgresLedgerStore};
use orders::{
    HttpPricingClient, InMemoryOrderRepository, OrderError, OrderRepository, OrderService,
    PostgresOrderRepository, PricingClient,
};
use payments::{
    HttpOrderClient, HttpPaymentGateway, InMemoryPaymentGateway, InMemoryPaymentRepository,
    OrderClient, PaymentError, PaymentGateway, PaymentRepository, PaymentService,
    PostgresPaymentRepository,
};
use sqlx::PgPool;
use thiserror::Error;

use crate::AppState;
use crate::config::Config;
use crate::local::LocalOrderClient;

/// Errors raised while assembling the process.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("pricing client: {0}")]
    Pricing(#[from] OrderError),

    #[error("payment collaborators: {0}")]
    Payments(#[from] PaymentError),

    #[error("event bus: {0}")]
    Bus(#[from] BusError),
}

/// Where state lives.
#[derive(Clone)]
pub enum Backend {
    /// Everything in process memory; lost on restart.
    InMemory,
    Postgres(PgPool),
}

/// Out-of-process services the pipeline calls synchronously.
#[derive(Clone)]
pub struct Collaborators {
    pub pricing: Arc<dyn PricingClient>,
    pub gateway: Arc<dyn PaymentGateway>,
    /// Remote order service; `None` calls the in-process one.
    pub order_client: Option<Arc<dyn OrderClient>>,
}

impl Collaborators {
    /// HTTP clients built from configuration.
    pub fn from_config(config: &Config) -> Result<Self, BootstrapError> {
        let pricing = HttpPricingClient::new(&config.pricing_service_url, config.http_timeout)?;

        let gateway: Arc<dyn PaymentGateway> = match config.gateway_credentials() {
            Some((key_id, key_secret)) => Arc::new(HttpPaymentGateway::new(
                &config.gateway_base_url,
                key_id,
                key_secret,
                config.http_timeout,
            )?),
            None => {
                tracing::warn!("gateway credentials not configured, using in-memory gateway");
                Arc::new(InMemoryPaymentGateway::new())
            }
        };

        let order_client: Option<Arc<dyn OrderClient>> = match &config.order_service_url {
            Some(url) => Some(Arc::new(HttpOrderClient::new(url, config.http_timeout)?)),
            None => None,
        };

        Ok(Self {
            pricing: Arc::new(pricing),
            gateway,
            order_client,
        })
    }
}

/// The assembled services plus what the ledger consumer needs.
pub struct Pipeline {
    pub state: AppState,
    pub bus: EventBus,
    pub topology: Topology,
    pub consumer: Arc<LedgerConsumer>,
}

impl Pipeline {
    /// Builds every service and declares the ledger topology.
    pub async fn build(
        config: &Config,
        backend: Backend,
        collaborators: Collaborators,
    ) -> Result<Self, BootstrapError> {
        let (broker, order_repo, payment_repo, ledger_store): (
            Arc<dyn Broker>,
            Arc<dyn OrderRepository>,
            Arc<dyn PaymentRepository>,
            Arc<dyn LedgerStore>,
        ) = match backend {
            Backend::InMemory => (
                Arc::new(InMemoryBroker::new()),
                Arc::new(InMemoryOrderRepository::new()),
                Arc::new(InMemoryPaymentRepository::new()),
                Arc::new(InMemoryLedgerStore::new()),
            ),
            Backend::Postgres(pool) => (
                Arc::new(PostgresBroker::new(pool.clone())),
                Arc::new(PostgresOrderRepository::new(pool.clone())),
                Arc::new(PostgresPaymentRepository::new(pool.clone())),
                Arc::new(PostgresLedgerStore::new(pool)),
            ),
        };

        let bus = EventBus::new(broker, config.bus_exchange.clone());
        let topology = ledger::topology(&config.bus_exchange, &config.ledger_queue);
        bus.declare(&topology).await?;

        let orders = OrderService::new(order_repo, collaborators.pricing, bus.clone());
        let order_client = collaborators
            .order_client
            .unwrap_or_else(|| Arc::new(LocalOrderClient::new(orders.clone())));
        let payments = PaymentService::new(
            payment_repo,
            collaborators.gateway,
            order_client,
            bus.clone(),
            config.webhook_secret.clone(),
        );
        let ledger = LedgerService::new(ledger_store, bus.clone());

        Ok(Self {
            consumer: Arc::new(LedgerConsumer::new(ledger.clone())),
            state: AppState {
                orders,
                payments,
                ledger,
            },
            bus,
            topology,
        })
    }
}
