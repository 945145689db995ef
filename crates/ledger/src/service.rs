//! Ledger service: commission postings, payouts and reconciliation.

use std::sync::Arc;

use common::{Money, OrderId, PayoutId, SellerId};
use event_bus::{EventBus, keys};

use crate::posting;
use crate::store::{LedgerStore, OrderEntry, PostOutcome};
use crate::{
    LedgerError, PayoutRequest, PayoutStatus, Reconciliation, Result, TransactionType, Wallet,
    WalletCommissionEvent, WalletTransaction,
};

/// Service owning seller wallets.
///
/// Balances only move together with a ledger entry. Notifications are
/// published after the posting committed and are best-effort.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    bus: EventBus,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// Locks the commission of a paid order into the pending balance.
    #[tracing::instrument(skip(self))]
    pub async fn on_payment_success(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        commission: Money,
    ) -> Result<PostOutcome> {
        self.post(seller_id, order_id, TransactionType::CommissionCreated, commission)
            .await
    }

    /// Moves the commission of a delivered order to the available balance.
    #[tracing::instrument(skip(self))]
    pub async fn on_order_delivered(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        commission: Money,
    ) -> Result<PostOutcome> {
        self.post(seller_id, order_id, TransactionType::CommissionUnlocked, commission)
            .await
    }

    /// Reverses the pending commission of a cancelled order.
    #[tracing::instrument(skip(self))]
    pub async fn on_order_cancelled(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        commission: Money,
    ) -> Result<PostOutcome> {
        self.post(seller_id, order_id, TransactionType::Refund, commission)
            .await
    }

    async fn post(
        &self,
        seller_id: SellerId,
        order_id: OrderId,
        kind: TransactionType,
        commission: Money,
    ) -> Result<PostOutcome> {
        if commission.is_negative() {
            return Err(LedgerError::Validation(format!(
                "commission for order {order_id} must not be negative"
            )));
        }

        let outcome = self
            .store
            .post(OrderEntry {
                seller_id,
                order_id,
                kind,
                commission,
            })
            .await?;

        match &outcome {
            PostOutcome::Applied {
                wallet,
                transaction,
            } => {
                metrics::counter!("ledger_postings_total", "kind" => kind.as_str()).increment(1);
                tracing::info!(
                    wallet_id = %wallet.id,
                    %order_id,
                    kind = %kind,
                    amount = %transaction.amount,
                    pending = %wallet.pending_balance,
                    available = %wallet.available_balance,
                    "ledger entry posted"
                );
                self.notify(kind, wallet, order_id, commission).await;
            }
            PostOutcome::Duplicate { wallet } => {
                metrics::counter!("ledger_duplicate_events_total").increment(1);
                tracing::info!(wallet_id = %wallet.id, %order_id, kind = %kind, "duplicate event ignored");
            }
            PostOutcome::Superseded { wallet, by } => {
                tracing::warn!(
                    wallet_id = %wallet.id,
                    %order_id,
                    kind = %kind,
                    superseded_by = %by,
                    "out-of-order event ignored"
                );
            }
            PostOutcome::NothingLocked { wallet } => {
                tracing::info!(wallet_id = %wallet.id, %order_id, "no locked commission to refund");
            }
        }

        Ok(outcome)
    }

    async fn notify(&self, kind: TransactionType, wallet: &Wallet, order_id: OrderId, amount: Money) {
        let routing_key = match kind {
            TransactionType::CommissionCreated => keys::WALLET_COMMISSION_CREATED,
            TransactionType::CommissionUnlocked => keys::WALLET_COMMISSION_UNLOCKED,
            TransactionType::Refund | TransactionType::PayoutProcessed => return,
        };

        let event = WalletCommissionEvent {
            wallet_id: wallet.id,
            seller_id: wallet.seller_id,
            order_id,
            amount,
            pending_balance: wallet.pending_balance,
            available_balance: wallet.available_balance,
        };
        if !self.bus.publish(routing_key, &event).await {
            tracing::warn!(wallet_id = %wallet.id, %order_id, routing_key, "wallet event not published");
        }
    }

    pub async fn get_wallet(&self, seller_id: SellerId) -> Result<Wallet> {
        self.store
            .wallet(seller_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("wallet for seller {seller_id}")))
    }

    /// The seller's ledger, oldest entry first.
    pub async fn transactions(&self, seller_id: SellerId) -> Result<Vec<WalletTransaction>> {
        let wallet = self.get_wallet(seller_id).await?;
        self.store.transactions(wallet.id).await
    }

    pub async fn payout_requests(&self, seller_id: SellerId) -> Result<Vec<PayoutRequest>> {
        let wallet = self.get_wallet(seller_id).await?;
        self.store.payouts(wallet.id).await
    }

    /// Requests a withdrawal of `amount` from the available balance.
    #[tracing::instrument(skip(self, notes))]
    pub async fn create_payout_request(
        &self,
        seller_id: SellerId,
        amount: Money,
        notes: Option<String>,
    ) -> Result<PayoutRequest> {
        if !amount.is_positive() {
            return Err(LedgerError::Validation(
                "payout amount must be positive".to_string(),
            ));
        }

        let payout = self.store.create_payout(seller_id, amount, notes).await?;
        tracing::info!(payout_id = %payout.id, wallet_id = %payout.wallet_id, %amount, "payout requested");
        Ok(payout)
    }

    /// Decides a pending payout.
    ///
    /// `Processed` debits the available balance; any other status rejects
    /// the request without touching balances.
    #[tracing::instrument(skip(self, notes))]
    pub async fn update_payout_status(
        &self,
        payout_id: PayoutId,
        status: PayoutStatus,
        notes: Option<String>,
    ) -> Result<PayoutRequest> {
        if status == PayoutStatus::Processed {
            let (payout, wallet, transaction) = self.store.process_payout(payout_id).await?;
            metrics::counter!("payouts_processed_total").increment(1);
            metrics::counter!("ledger_postings_total", "kind" => transaction.kind.as_str())
                .increment(1);
            tracing::info!(
                %payout_id,
                wallet_id = %wallet.id,
                amount = %payout.amount,
                available = %wallet.available_balance,
                "payout processed"
            );
            return Ok(payout);
        }

        let payout = self.store.reject_payout(payout_id, notes).await?;
        tracing::info!(%payout_id, requested = %status, "payout rejected");
        Ok(payout)
    }

    /// Recomputes the seller's balances from the transaction log.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, seller_id: SellerId) -> Result<Reconciliation> {
        let wallet = self.get_wallet(seller_id).await?;
        let transactions = self.store.transactions(wallet.id).await?;
        let expected = posting::replay(transactions.iter().map(|t| (t.kind, t.amount)));

        let report = Reconciliation {
            wallet_id: wallet.id,
            seller_id,
            pending_balance: wallet.pending_balance,
            available_balance: wallet.available_balance,
            expected_pending: expected.pending,
            expected_available: expected.available,
            transaction_count: transactions.len(),
        };
        if !report.is_balanced() {
            tracing::error!(
                wallet_id = %wallet.id,
                pending = %report.pending_balance,
                expected_pending = %report.expected_pending,
                available = %report.available_balance,
                expected_available = %report.expected_available,
                "wallet balances drifted from ledger"
            );
        }
        Ok(report)
    }
}
