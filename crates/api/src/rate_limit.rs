//! Per-route rate limiting.
//!
//! Routes are matched against a declarative [`RateLimitTable`]; the first
//! matching rule applies. Each rule keeps a fixed-window counter per client
//! IP.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::Config;

/// One row of the rate-limit table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    /// `None` matches every method.
    pub method: Option<Method>,
    pub path_prefix: &'static str,
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(
        method: Option<Method>,
        path_prefix: &'static str,
        max_requests: u32,
        window: Duration,
    ) -> Self {
        Self {
            method,
            path_prefix,
            max_requests,
            window,
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().is_none_or(|m| m == method) && path.starts_with(self.path_prefix)
    }
}

/// Ordered rate-limit rules; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct RateLimitTable {
    rules: Vec<RateLimitRule>,
}

impl RateLimitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: RateLimitRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// The table used by the server.
    ///
    /// Gateway webhooks get their own, larger budget so that retries from
    /// the gateway are not throttled by client traffic. Health and metrics
    /// are never limited.
    pub fn from_config(config: &Config) -> Self {
        let window = config.rate_limit_window;
        Self::new()
            .rule(RateLimitRule::new(
                Some(Method::POST),
                "/payments/webhook",
                config.rate_limit_webhook_max_requests,
                window,
            ))
            .rule(RateLimitRule::new(
                None,
                "/orders",
                config.rate_limit_max_requests,
                window,
            ))
            .rule(RateLimitRule::new(
                None,
                "/payments",
                config.rate_limit_max_requests,
                window,
            ))
            .rule(RateLimitRule::new(
                None,
                "/wallets",
                config.rate_limit_max_requests,
                window,
            ))
            .rule(RateLimitRule::new(
                None,
                "/payouts",
                config.rate_limit_max_requests,
                window,
            ))
    }

    fn find(&self, method: &Method, path: &str) -> Option<(usize, &RateLimitRule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(method, path))
    }

    /// Longest window of any rule.
    fn max_window(&self) -> Duration {
        self.rules
            .iter()
            .map(|r| r.window)
            .max()
            .unwrap_or_default()
    }
}

struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window counters keyed by rule and client IP.
#[derive(Clone)]
pub struct RateLimiter {
    table: Arc<RateLimitTable>,
    windows: Arc<Mutex<HashMap<(usize, String), Window>>>,
}

impl RateLimiter {
    pub fn new(table: RateLimitTable) -> Self {
        Self {
            table: Arc::new(table),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `true` if the request is allowed, `false` if rate-limited.
    pub async fn check(&self, method: &Method, path: &str, ip: &str) -> bool {
        let Some((index, rule)) = self.table.find(method, path) else {
            return true;
        };

        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window = windows
            .entry((index, ip.to_owned()))
            .or_insert_with(|| Window {
                count: 0,
                started: now,
            });

        if now.duration_since(window.started) >= rule.window {
            window.count = 0;
            window.started = now;
        }

        window.count += 1;
        window.count <= rule.max_requests
    }

    /// Drops counters whose window has expired.
    pub async fn cleanup(&self) {
        let longest = self.table.max_window();
        let now = Instant::now();
        self.windows
            .lock()
            .await
            .retain(|_, window| now.duration_since(window.started) < longest);
    }
}

/// Client IP: first `X-Forwarded-For` entry, then the peer address.
fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
        && !first.trim().is_empty()
    {
        return first.trim().to_owned();
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Middleware applying the rate-limit table.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    if !limiter
        .check(request.method(), request.uri().path(), &ip)
        .await
    {
        metrics::counter!("http_requests_rate_limited_total").increment(1);
        tracing::warn!(%ip, path = %request.uri().path(), "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(serde_json::json!({"error": "Too many requests, try again later"})),
        )
            .into_response();
    }
    next.run(request).await
}
