//! Internal payment status and the gateway vocabulary mapping.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Internal payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Success,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown payment status: {s}"))
    }
}

/// Gateway event names.
const EVENT_TABLE: &[(&str, PaymentStatus)] = &[
    ("payment.authorized", PaymentStatus::Processing),
    ("payment.captured", PaymentStatus::Success),
    ("payment.failed", PaymentStatus::Failed),
    ("order.paid", PaymentStatus::Success),
    ("refund.created", PaymentStatus::Refunded),
    ("refund.processed", PaymentStatus::Refunded),
    ("payment.refunded", PaymentStatus::Refunded),
];

/// Gateway entity status strings.
const STATUS_TABLE: &[(&str, PaymentStatus)] = &[
    ("created", PaymentStatus::Pending),
    ("pending", PaymentStatus::Pending),
    ("authorized", PaymentStatus::Processing),
    ("processing", PaymentStatus::Processing),
    ("captured", PaymentStatus::Success),
    ("paid", PaymentStatus::Success),
    ("success", PaymentStatus::Success),
    ("succeeded", PaymentStatus::Success),
    ("failed", PaymentStatus::Failed),
    ("refunded", PaymentStatus::Refunded),
];

fn lookup(table: &[(&str, PaymentStatus)], key: &str) -> Option<PaymentStatus> {
    let key = key.trim();
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, status)| *status)
}

/// Maps a gateway event name and/or entity status to the internal status.
///
/// The event name wins when both are recognised. Unrecognised input maps
/// to [`PaymentStatus::Pending`].
pub fn map_gateway_status(event: Option<&str>, status: Option<&str>) -> PaymentStatus {
    event
        .and_then(|e| lookup(EVENT_TABLE, e))
        .or_else(|| status.and_then(|s| lookup(STATUS_TABLE, s)))
        .unwrap_or_default()
}
