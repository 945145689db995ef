//! API server entry point.

use std::net::SocketAddr;
use std::time::Duration;

use api::config::{Config, LogFormat};
use api::rate_limit::{RateLimitTable, RateLimiter};
use api::{Backend, Collaborators, Pipeline};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn connect(config: &Config) -> Backend {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, state is kept in memory");
        return Backend::InMemory;
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .expect("failed to connect to database");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    tracing::info!("database ready");
    Backend::Postgres(pool)
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Stores, broker, collaborators and services
    let backend = connect(&config).await;
    let collaborators = Collaborators::from_config(&config).expect("invalid collaborator config");
    let pipeline = Pipeline::build(&config, backend, collaborators)
        .await
        .expect("failed to assemble services");

    // 4. Ledger consumer, one sequential consumer for the queue
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = {
        let bus = pipeline.bus.clone();
        let queue = pipeline.topology.queue.clone();
        let handler = pipeline.consumer.clone();
        let poll_interval = config.bus_poll_interval;
        tokio::spawn(async move {
            if let Err(e) = bus
                .run_consumer(&queue, handler, poll_interval, shutdown_rx)
                .await
            {
                tracing::error!(error = %e, "ledger consumer failed");
            }
        })
    };

    // 5. Rate limiter with periodic cleanup
    let rate_limiter = RateLimiter::new(RateLimitTable::from_config(&config));
    {
        let rate_limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                rate_limiter.cleanup().await;
            }
        });
    }

    // 6. Build the application and serve
    let app = api::create_app(pipeline.state, rate_limiter, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    // 7. Let the consumer finish its current message
    let _ = shutdown_tx.send(true);
    if let Err(e) = consumer.await {
        tracing::error!(error = %e, "ledger consumer task panicked");
    }

    tracing::info!("server shut down gracefully");
}
