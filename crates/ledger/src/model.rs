//! Wallets, ledger entries and payout requests.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PayoutId, SellerId, WalletId};
use serde::{Deserialize, Serialize};

/// A seller's commission account.
///
/// The balances are a cached summary of the wallet's transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub seller_id: SellerId,
    /// Commission earned on orders not yet delivered.
    pub pending_balance: Money,
    /// Commission confirmed and withdrawable.
    pub available_balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(seller_id: SellerId) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::new(),
            seller_id,
            pending_balance: Money::zero(),
            available_balance: Money::zero(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn balances(&self) -> Balances {
        Balances {
            pending: self.pending_balance,
            available: self.available_balance,
        }
    }

    pub(crate) fn set_balances(&mut self, balances: Balances) {
        self.pending_balance = balances.pending;
        self.available_balance = balances.available;
        self.updated_at = Utc::now();
    }
}

/// The two balance buckets of a wallet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balances {
    pub pending: Money,
    pub available: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    CommissionCreated,
    CommissionUnlocked,
    Refund,
    PayoutProcessed,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::CommissionCreated => "COMMISSION_CREATED",
            TransactionType::CommissionUnlocked => "COMMISSION_UNLOCKED",
            TransactionType::Refund => "REFUND",
            TransactionType::PayoutProcessed => "PAYOUT_PROCESSED",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMMISSION_CREATED" => Ok(TransactionType::CommissionCreated),
            "COMMISSION_UNLOCKED" => Ok(TransactionType::CommissionUnlocked),
            "REFUND" => Ok(TransactionType::Refund),
            "PAYOUT_PROCESSED" => Ok(TransactionType::PayoutProcessed),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Immutable ledger entry. `balance_after == balance_before + amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: i64,
    pub wallet_id: WalletId,
    /// Order the entry was posted for; payouts carry a payout id instead.
    pub order_id: Option<OrderId>,
    pub payout_id: Option<PayoutId>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Processed,
    Rejected,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "PENDING",
            PayoutStatus::Processed => "PROCESSED",
            PayoutStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PayoutStatus::Pending),
            "PROCESSED" => Ok(PayoutStatus::Processed),
            "REJECTED" => Ok(PayoutStatus::Rejected),
            other => Err(format!("unknown payout status: {other}")),
        }
    }
}

/// A withdrawal request against a wallet's available balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub id: PayoutId,
    pub wallet_id: WalletId,
    pub amount: Money,
    pub status: PayoutStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Commission-bearing payload of `payment.success`, `order.delivered` and
/// `order.cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionEvent {
    pub order_id: OrderId,
    #[serde(default)]
    pub seller_id: Option<SellerId>,
    /// Order or payment amount, informational.
    #[serde(default, alias = "totalAmount")]
    pub amount: Option<Money>,
    #[serde(default)]
    pub commission: Money,
}

/// Payload of `wallet.commission.created` and `wallet.commission.unlocked`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCommissionEvent {
    pub wallet_id: WalletId,
    pub seller_id: SellerId,
    pub order_id: OrderId,
    pub amount: Money,
    pub pending_balance: Money,
    pub available_balance: Money,
}

/// Result of replaying a wallet's transaction log against its balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub wallet_id: WalletId,
    pub seller_id: SellerId,
    pub pending_balance: Money,
    pub available_balance: Money,
    pub expected_pending: Money,
    pub expected_available: Money,
    pub transaction_count: usize,
}

impl Reconciliation {
    /// True when the cached balances match the transaction log.
    pub fn is_balanced(&self) -> bool {
        self.pending_balance == self.expected_pending
            && self.available_balance == self.expected_available
    }
}
