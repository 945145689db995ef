//! Ledger persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{Money, OrderId, PayoutId, SellerId, WalletId};
use tokio::sync::Mutex;

use crate::posting::{self, PostingDecision};
use crate::{
    LedgerError, PayoutRequest, PayoutStatus, Result, TransactionType, Wallet, WalletTransaction,
};

/// An order-driven ledger entry to post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderEntry {
    pub seller_id: SellerId,
    pub order_id: OrderId,
    pub kind: TransactionType,
    pub commission: Money,
}

/// What posting an order entry did.
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    Applied {
        wallet: Wallet,
        transaction: WalletTransaction,
    },
    /// Already posted; nothing changed.
    Duplicate { wallet: Wallet },
    /// A later stage of the order was already posted; nothing changed.
    Superseded {
        wallet: Wallet,
        by: TransactionType,
    },
    /// Cancellation of an order that never locked commission; nothing changed.
    NothingLocked { wallet: Wallet },
}

/// Storage for wallets, ledger entries and payout requests.
///
/// Every balance change and its ledger entry are written in one atomic
/// step. Order entries are unique per `(wallet, order, type)`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Gets or creates the seller's wallet and posts the entry under lock.
    async fn post(&self, entry: OrderEntry) -> Result<PostOutcome>;

    async fn wallet(&self, seller_id: SellerId) -> Result<Option<Wallet>>;

    /// Ledger entries of a wallet, oldest first.
    async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<WalletTransaction>>;

    /// Creates a pending payout if `amount` does not exceed the available
    /// balance.
    async fn create_payout(
        &self,
        seller_id: SellerId,
        amount: Money,
        notes: Option<String>,
    ) -> Result<PayoutRequest>;

    async fn payout(&self, payout_id: PayoutId) -> Result<Option<PayoutRequest>>;

    /// Payout requests of a wallet, newest first.
    async fn payouts(&self, wallet_id: WalletId) -> Result<Vec<PayoutRequest>>;

    /// Approves a pending payout, debiting the available balance.
    async fn process_payout(
        &self,
        payout_id: PayoutId,
    ) -> Result<(PayoutRequest, Wallet, WalletTransaction)>;

    /// Rejects a pending payout. Balances are untouched.
    async fn reject_payout(
        &self,
        payout_id: PayoutId,
        notes: Option<String>,
    ) -> Result<PayoutRequest>;
}

#[derive(Default)]
struct InMemoryLedger {
    wallets: HashMap<SellerId, Wallet>,
    transactions: Vec<WalletTransaction>,
    payouts: HashMap<PayoutId, PayoutRequest>,
}

impl InMemoryLedger {
    fn wallet_by_id(&mut self, wallet_id: WalletId) -> Result<&mut Wallet> {
        self.wallets
            .values_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| LedgerError::NotFound(format!("wallet {wallet_id}")))
    }

    fn pending_payout(&self, payout_id: PayoutId, to: PayoutStatus) -> Result<PayoutRequest> {
        let payout = self
            .payouts
            .get(&payout_id)
            .ok_or_else(|| LedgerError::NotFound(format!("payout request {payout_id}")))?;
        if payout.status != PayoutStatus::Pending {
            return Err(LedgerError::InvalidPayoutTransition {
                from: payout.status,
                to,
            });
        }
        Ok(payout.clone())
    }
}

/// In-memory ledger for development and testing.
///
/// One mutex guards all state, so each operation is atomic.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<InMemoryLedger>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ledger entries stored.
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn post(&self, entry: OrderEntry) -> Result<PostOutcome> {
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let wallet = state
            .wallets
            .entry(entry.seller_id)
            .or_insert_with(|| Wallet::new(entry.seller_id));

        let prior: Vec<TransactionType> = state
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet.id && t.order_id == Some(entry.order_id))
            .map(|t| t.kind)
            .collect();

        match posting::decide(entry.kind, &prior) {
            PostingDecision::Duplicate => {
                return Ok(PostOutcome::Duplicate {
                    wallet: wallet.clone(),
                });
            }
            PostingDecision::Superseded(by) => {
                return Ok(PostOutcome::Superseded {
                    wallet: wallet.clone(),
                    by,
                });
            }
            PostingDecision::NothingLocked => {
                return Ok(PostOutcome::NothingLocked {
                    wallet: wallet.clone(),
                });
            }
            PostingDecision::Apply => {}
        }

        let posting = posting::order_posting(entry.kind, wallet.balances(), entry.commission)?;
        wallet.set_balances(posting.balances);

        let transaction = WalletTransaction {
            id: state.transactions.len() as i64 + 1,
            wallet_id: wallet.id,
            order_id: Some(entry.order_id),
            payout_id: None,
            kind: posting.kind,
            amount: posting.amount,
            balance_before: posting.balance_before,
            balance_after: posting.balance_after,
            description: None,
            created_at: Utc::now(),
        };
        state.transactions.push(transaction.clone());

        Ok(PostOutcome::Applied {
            wallet: wallet.clone(),
            transaction,
        })
    }

    async fn wallet(&self, seller_id: SellerId) -> Result<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(&seller_id).cloned())
    }

    async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .state
            .lock()
            .await
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn create_payout(
        &self,
        seller_id: SellerId,
        amount: Money,
        notes: Option<String>,
    ) -> Result<PayoutRequest> {
        let mut state = self.state.lock().await;
        let wallet = state
            .wallets
            .get(&seller_id)
            .ok_or_else(|| LedgerError::NotFound(format!("wallet for seller {seller_id}")))?;
        if amount > wallet.available_balance {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: wallet.available_balance,
            });
        }

        let payout = PayoutRequest {
            id: PayoutId::new(),
            wallet_id: wallet.id,
            amount,
            status: PayoutStatus::Pending,
            notes,
            created_at: Utc::now(),
            processed_at: None,
        };
        state.payouts.insert(payout.id, payout.clone());
        Ok(payout)
    }

    async fn payout(&self, payout_id: PayoutId) -> Result<Option<PayoutRequest>> {
        Ok(self.state.lock().await.payouts.get(&payout_id).cloned())
    }

    async fn payouts(&self, wallet_id: WalletId) -> Result<Vec<PayoutRequest>> {
        let state = self.state.lock().await;
        let mut payouts: Vec<PayoutRequest> = state
            .payouts
            .values()
            .filter(|p| p.wallet_id == wallet_id)
            .cloned()
            .collect();
        payouts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payouts)
    }

    async fn process_payout(
        &self,
        payout_id: PayoutId,
    ) -> Result<(PayoutRequest, Wallet, WalletTransaction)> {
        let mut state = self.state.lock().await;
        let mut payout = state.pending_payout(payout_id, PayoutStatus::Processed)?;
        let next_id = state.transactions.len() as i64 + 1;

        let wallet = state.wallet_by_id(payout.wallet_id)?;
        let posting = posting::payout_processed(wallet.balances(), payout.amount)?;
        wallet.set_balances(posting.balances);
        let wallet = wallet.clone();

        let now = Utc::now();
        let transaction = WalletTransaction {
            id: next_id,
            wallet_id: wallet.id,
            order_id: None,
            payout_id: Some(payout.id),
            kind: posting.kind,
            amount: posting.amount,
            balance_before: posting.balance_before,
            balance_after: posting.balance_after,
            description: Some(format!("Payout {}", payout.id)),
            created_at: now,
        };
        state.transactions.push(transaction.clone());

        payout.status = PayoutStatus::Processed;
        payout.processed_at = Some(now);
        state.payouts.insert(payout.id, payout.clone());

        Ok((payout, wallet, transaction))
    }

    async fn reject_payout(
        &self,
        payout_id: PayoutId,
        notes: Option<String>,
    ) -> Result<PayoutRequest> {
        let mut state = self.state.lock().await;
        let mut payout = state.pending_payout(payout_id, PayoutStatus::Rejected)?;

        payout.status = PayoutStatus::Rejected;
        payout.processed_at = Some(Utc::now());
        if notes.is_some() {
            payout.notes = notes;
        }
        state.payouts.insert(payout.id, payout.clone());
        Ok(payout)
    }
}
