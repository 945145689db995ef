//! Application configuration loaded from environment variables.

use std::time::Duration;

use thiserror::Error;

/// Deployment environment, from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Log output format, from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Configuration that cannot be used to start the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("WEBHOOK_SECRET must be set in production")]
    MissingWebhookSecret,

    #[error("GATEWAY_KEY_ID and GATEWAY_KEY_SECRET must be set together")]
    PartialGatewayCredentials,

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `APP_ENV`: `development` or `production`
/// - `DATABASE_URL`: PostgreSQL; in-memory stores and broker when unset
/// - `BUS_EXCHANGE`, `LEDGER_QUEUE`: event bus names
/// - `PRICING_SERVICE_URL`: pricing collaborator
/// - `ORDER_SERVICE_URL`: remote order service; the in-process one when unset
/// - `GATEWAY_BASE_URL`, `GATEWAY_KEY_ID`, `GATEWAY_KEY_SECRET`: payment
///   gateway; an in-memory gateway when the credentials are unset
/// - `WEBHOOK_SECRET`: gateway webhook signing secret
/// - `HTTP_TIMEOUT_SECS`, `BUS_POLL_INTERVAL_MS`
/// - `RATE_LIMIT_MAX_REQUESTS`, `RATE_LIMIT_WINDOW_SECS`,
///   `RATE_LIMIT_WEBHOOK_MAX_REQUESTS`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub environment: Environment,
    pub database_url: Option<String>,
    pub bus_exchange: String,
    pub ledger_queue: String,
    pub pricing_service_url: String,
    pub order_service_url: Option<String>,
    pub gateway_base_url: String,
    pub gateway_key_id: Option<String>,
    pub gateway_key_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub http_timeout: Duration,
    pub bus_poll_interval: Duration,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    pub rate_limit_webhook_max_requests: u32,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT", defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            environment: var("APP_ENV")
                .map(|v| Environment::parse(&v))
                .unwrap_or(defaults.environment),
            database_url: var("DATABASE_URL"),
            bus_exchange: var("BUS_EXCHANGE").unwrap_or(defaults.bus_exchange),
            ledger_queue: var("LEDGER_QUEUE").unwrap_or(defaults.ledger_queue),
            pricing_service_url: var("PRICING_SERVICE_URL")
                .unwrap_or(defaults.pricing_service_url),
            order_service_url: var("ORDER_SERVICE_URL"),
            gateway_base_url: var("GATEWAY_BASE_URL").unwrap_or(defaults.gateway_base_url),
            gateway_key_id: var("GATEWAY_KEY_ID"),
            gateway_key_secret: var("GATEWAY_KEY_SECRET"),
            webhook_secret: var("WEBHOOK_SECRET"),
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS", 30)),
            bus_poll_interval: Duration::from_millis(parsed("BUS_POLL_INTERVAL_MS", 250)),
            rate_limit_max_requests: parsed(
                "RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            ),
            rate_limit_window: Duration::from_secs(parsed("RATE_LIMIT_WINDOW_SECS", 60)),
            rate_limit_webhook_max_requests: parsed(
                "RATE_LIMIT_WEBHOOK_MAX_REQUESTS",
                defaults.rate_limit_webhook_max_requests,
            ),
        }
    }

    /// Rejects configurations that must not be used to serve traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment == Environment::Production && self.webhook_secret.is_none() {
            return Err(ConfigError::MissingWebhookSecret);
        }
        if self.gateway_key_id.is_some() != self.gateway_key_secret.is_some() {
            return Err(ConfigError::PartialGatewayCredentials);
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::ZeroValue("HTTP_TIMEOUT_SECS"));
        }
        if self.rate_limit_window.is_zero() {
            return Err(ConfigError::ZeroValue("RATE_LIMIT_WINDOW_SECS"));
        }
        Ok(())
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Gateway credentials, when both halves are configured.
    pub fn gateway_credentials(&self) -> Option<(&str, &str)> {
        match (&self.gateway_key_id, &self.gateway_key_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            environment: Environment::Development,
            database_url: None,
            bus_exchange: "ecommerce.events".to_string(),
            ledger_queue: "ledger.events".to_string(),
            pricing_service_url: "http://localhost:3002".to_string(),
            order_service_url: None,
            gateway_base_url: "https://api.razorpay.com".to_string(),
            gateway_key_id: None,
            gateway_key_secret: None,
            webhook_secret: None,
            http_timeout: Duration::from_secs(30),
            bus_poll_interval: Duration::from_millis(250),
            rate_limit_max_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_webhook_max_requests: 600,
        }
    }
}
