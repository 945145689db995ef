//! HTTP API server for the order settlement pipeline.
//!
//! Runs the order, payment and ledger services in one process: REST
//! endpoints for orders, payments, gateway webhooks, wallets and payouts,
//! plus the ledger's event consumer. Structured logging via tracing and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod local;
pub mod pipeline;
pub mod rate_limit;
pub mod routes;

use axum::Router;
use axum::middleware;
use axum::routing::{get, patch, post};
use ledger::LedgerService;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::OrderService;
use payments::PaymentService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use rate_limit::RateLimiter;

pub use pipeline::{Backend, BootstrapError, Collaborators, Pipeline};

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub payments: PaymentService,
    pub ledger: LedgerService,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(
    state: AppState,
    rate_limiter: RateLimiter,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let api = Router::new()
        .route(
            "/orders",
            post(routes::orders::create).get(routes::orders::list),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/status", patch(routes::orders::update_status))
        .route("/orders/{id}/history", get(routes::orders::history))
        .route("/payments", post(routes::payments::create))
        .route(
            "/payments/gateway-order",
            post(routes::payments::create_gateway_order),
        )
        .route("/payments/webhook", post(routes::payments::webhook))
        .route(
            "/payments/order/{order_id}",
            get(routes::payments::get_by_order),
        )
        .route("/payments/{id}/logs", get(routes::payments::logs))
        .route("/wallets/{seller_id}", get(routes::wallets::get))
        .route(
            "/wallets/{seller_id}/transactions",
            get(routes::wallets::transactions),
        )
        .route(
            "/wallets/{seller_id}/payouts",
            get(routes::wallets::payouts).post(routes::wallets::create_payout),
        )
        .route(
            "/wallets/{seller_id}/reconciliation",
            get(routes::wallets::reconcile),
        )
        .route("/payouts/{id}", patch(routes::wallets::update_payout))
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit::rate_limit,
        ));

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(api)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
