use async_trait::async_trait;
use chrono::Utc;
use common::{Money, OrderId, PayoutId, SellerId, WalletId};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::posting::{self, Posting, PostingDecision};
use crate::store::{LedgerStore, OrderEntry, PostOutcome};
use crate::{
    LedgerError, PayoutRequest, PayoutStatus, Result, TransactionType, Wallet, WalletTransaction,
};

const WALLET_COLUMNS: &str =
    "id, seller_id, pending_balance, available_balance, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, wallet_id, order_id, payout_id, type, amount, \
     balance_before, balance_after, description, created_at";
const PAYOUT_COLUMNS: &str = "id, wallet_id, amount, status, notes, created_at, processed_at";

/// PostgreSQL ledger store.
///
/// Each posting locks the wallet row with `SELECT ... FOR UPDATE`, so
/// concurrent events for one seller apply one at a time.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode_error(e: String) -> LedgerError {
        LedgerError::Database(sqlx::Error::Decode(e.into()))
    }

    fn row_to_wallet(row: &PgRow) -> Result<Wallet> {
        let pending: Decimal = row.try_get("pending_balance")?;
        let available: Decimal = row.try_get("available_balance")?;

        Ok(Wallet {
            id: WalletId::from_uuid(row.try_get("id")?),
            seller_id: SellerId::from_uuid(row.try_get("seller_id")?),
            pending_balance: Money::new(pending),
            available_balance: Money::new(available),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_transaction(row: &PgRow) -> Result<WalletTransaction> {
        let order_id: Option<Uuid> = row.try_get("order_id")?;
        let payout_id: Option<Uuid> = row.try_get("payout_id")?;
        let kind: String = row.try_get("type")?;
        let amount: Decimal = row.try_get("amount")?;
        let before: Decimal = row.try_get("balance_before")?;
        let after: Decimal = row.try_get("balance_after")?;

        Ok(WalletTransaction {
            id: row.try_get("id")?,
            wallet_id: WalletId::from_uuid(row.try_get("wallet_id")?),
            order_id: order_id.map(OrderId::from_uuid),
            payout_id: payout_id.map(PayoutId::from_uuid),
            kind: kind.parse().map_err(Self::decode_error)?,
            amount: Money::new(amount),
            balance_before: Money::new(before),
            balance_after: Money::new(after),
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_payout(row: &PgRow) -> Result<PayoutRequest> {
        let amount: Decimal = row.try_get("amount")?;
        let status: String = row.try_get("status")?;

        Ok(PayoutRequest {
            id: PayoutId::from_uuid(row.try_get("id")?),
            wallet_id: WalletId::from_uuid(row.try_get("wallet_id")?),
            amount: Money::new(amount),
            status: status.parse().map_err(Self::decode_error)?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }

    async fn lock_wallet(conn: &mut PgConnection, seller_id: SellerId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE seller_id = $1 FOR UPDATE"
        ))
        .bind(seller_id.as_uuid())
        .fetch_optional(conn)
        .await?;
        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    async fn lock_wallet_by_id(conn: &mut PgConnection, wallet_id: WalletId) -> Result<Wallet> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1 FOR UPDATE"
        ))
        .bind(wallet_id.as_uuid())
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("wallet {wallet_id}")))?;
        Self::row_to_wallet(&row)
    }

    async fn lock_pending_payout(
        conn: &mut PgConnection,
        payout_id: PayoutId,
        to: PayoutStatus,
    ) -> Result<PayoutRequest> {
        let row = sqlx::query(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payout_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(payout_id.as_uuid())
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("payout request {payout_id}")))?;

        let payout = Self::row_to_payout(&row)?;
        if payout.status != PayoutStatus::Pending {
            return Err(LedgerError::InvalidPayoutTransition {
                from: payout.status,
                to,
            });
        }
        Ok(payout)
    }

    /// Writes the new balances and the matching ledger entry.
    async fn apply(
        conn: &mut PgConnection,
        wallet: &mut Wallet,
        posting: &Posting,
        order_id: Option<OrderId>,
        payout_id: Option<PayoutId>,
        description: Option<String>,
    ) -> Result<WalletTransaction> {
        wallet.set_balances(posting.balances);

        sqlx::query(
            r#"
            UPDATE wallets
            SET pending_balance = $1, available_balance = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(wallet.pending_balance.amount())
        .bind(wallet.available_balance.amount())
        .bind(wallet.updated_at)
        .bind(wallet.id.as_uuid())
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO wallet_transactions (wallet_id, order_id, payout_id, type, amount,
                                             balance_before, balance_after, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(wallet.id.as_uuid())
        .bind(order_id.map(|id| id.as_uuid()))
        .bind(payout_id.map(|id| id.as_uuid()))
        .bind(posting.kind.as_str())
        .bind(posting.amount.amount())
        .bind(posting.balance_before.amount())
        .bind(posting.balance_after.amount())
        .bind(description)
        .fetch_one(&mut *conn)
        .await?;

        Self::row_to_transaction(&row)
    }

    fn is_duplicate_entry(err: &LedgerError) -> bool {
        matches!(
            err,
            LedgerError::Database(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some("wallet_transactions_event_key")
        )
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn post(&self, entry: OrderEntry) -> Result<PostOutcome> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO wallets (id, seller_id)
            VALUES ($1, $2)
            ON CONFLICT (seller_id) DO NOTHING
            "#,
        )
        .bind(WalletId::new().as_uuid())
        .bind(entry.seller_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        let mut wallet = Self::lock_wallet(&mut *tx, entry.seller_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("wallet for seller {}", entry.seller_id)))?;

        let prior: Vec<String> = sqlx::query_scalar(
            "SELECT type FROM wallet_transactions WHERE wallet_id = $1 AND order_id = $2",
        )
        .bind(wallet.id.as_uuid())
        .bind(entry.order_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;
        let prior = prior
            .iter()
            .map(|kind| kind.parse::<TransactionType>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Self::decode_error)?;

        match posting::decide(entry.kind, &prior) {
            PostingDecision::Duplicate => return Ok(PostOutcome::Duplicate { wallet }),
            PostingDecision::Superseded(by) => return Ok(PostOutcome::Superseded { wallet, by }),
            PostingDecision::NothingLocked => return Ok(PostOutcome::NothingLocked { wallet }),
            PostingDecision::Apply => {}
        }

        let posting = posting::order_posting(entry.kind, wallet.balances(), entry.commission)?;
        let applied =
            Self::apply(&mut *tx, &mut wallet, &posting, Some(entry.order_id), None, None).await;

        let transaction = match applied {
            Ok(transaction) => transaction,
            Err(e) if Self::is_duplicate_entry(&e) => {
                tx.rollback().await?;
                let wallet = self.wallet(entry.seller_id).await?.ok_or_else(|| {
                    LedgerError::NotFound(format!("wallet for seller {}", entry.seller_id))
                })?;
                return Ok(PostOutcome::Duplicate { wallet });
            }
            Err(e) => return Err(e),
        };

        tx.commit().await?;
        Ok(PostOutcome::Applied {
            wallet,
            transaction,
        })
    }

    async fn wallet(&self, seller_id: SellerId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE seller_id = $1"
        ))
        .bind(seller_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<WalletTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE wallet_id = $1 ORDER BY id ASC"
        ))
        .bind(wallet_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn create_payout(
        &self,
        seller_id: SellerId,
        amount: Money,
        notes: Option<String>,
    ) -> Result<PayoutRequest> {
        let mut tx = self.pool.begin().await?;

        let wallet = Self::lock_wallet(&mut *tx, seller_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("wallet for seller {seller_id}")))?;
        if amount > wallet.available_balance {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: wallet.available_balance,
            });
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payout_requests (id, wallet_id, amount, status, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PAYOUT_COLUMNS}
            "#
        ))
        .bind(PayoutId::new().as_uuid())
        .bind(wallet.id.as_uuid())
        .bind(amount.amount())
        .bind(PayoutStatus::Pending.as_str())
        .bind(&notes)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        let payout = Self::row_to_payout(&row)?;

        tx.commit().await?;
        Ok(payout)
    }

    async fn payout(&self, payout_id: PayoutId) -> Result<Option<PayoutRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payout_requests WHERE id = $1"
        ))
        .bind(payout_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_payout).transpose()
    }

    async fn payouts(&self, wallet_id: WalletId) -> Result<Vec<PayoutRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payout_requests WHERE wallet_id = $1 ORDER BY created_at DESC"
        ))
        .bind(wallet_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_payout).collect()
    }

    async fn process_payout(
        &self,
        payout_id: PayoutId,
    ) -> Result<(PayoutRequest, Wallet, WalletTransaction)> {
        let mut tx = self.pool.begin().await?;

        let payout = Self::lock_pending_payout(&mut *tx, payout_id, PayoutStatus::Processed).await?;
        let mut wallet = Self::lock_wallet_by_id(&mut *tx, payout.wallet_id).await?;

        let posting = posting::payout_processed(wallet.balances(), payout.amount)?;
        let transaction = Self::apply(
            &mut *tx,
            &mut wallet,
            &posting,
            None,
            Some(payout.id),
            Some(format!("Payout {}", payout.id)),
        )
        .await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE payout_requests
            SET status = $1, processed_at = $2
            WHERE id = $3
            RETURNING {PAYOUT_COLUMNS}
            "#
        ))
        .bind(PayoutStatus::Processed.as_str())
        .bind(transaction.created_at)
        .bind(payout.id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let payout = Self::row_to_payout(&row)?;

        tx.commit().await?;
        Ok((payout, wallet, transaction))
    }

    async fn reject_payout(
        &self,
        payout_id: PayoutId,
        notes: Option<String>,
    ) -> Result<PayoutRequest> {
        let mut tx = self.pool.begin().await?;

        Self::lock_pending_payout(&mut *tx, payout_id, PayoutStatus::Rejected).await?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE payout_requests
            SET status = $1, processed_at = now(), notes = COALESCE($2, notes)
            WHERE id = $3
            RETURNING {PAYOUT_COLUMNS}
            "#
        ))
        .bind(PayoutStatus::Rejected.as_str())
        .bind(&notes)
        .bind(payout_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        let payout = Self::row_to_payout(&row)?;

        tx.commit().await?;
        Ok(payout)
    }
}
