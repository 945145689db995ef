//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod wallets;

use crate::error::ApiError;

/// Parses a UUID path segment into a typed id.
pub(crate) fn parse_id<T>(
    raw: &str,
    what: &str,
    parse: impl FnOnce(&str) -> Result<T, uuid::Error>,
) -> Result<T, ApiError> {
    parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}
