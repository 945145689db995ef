//! PostgreSQL ledger store integration tests.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p ledger --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{Money, OrderId, SellerId};
use ledger::{
    LedgerError, LedgerStore, OrderEntry, PayoutStatus, PostOutcome, PostgresLedgerStore,
    TransactionType,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/004_create_ledger.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresLedgerStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE wallet_transactions, payout_requests, wallets")
        .execute(&pool)
        .await
        .unwrap();

    PostgresLedgerStore::new(pool)
}

fn entry(seller: SellerId, order: OrderId, kind: TransactionType, units: i64) -> OrderEntry {
    OrderEntry {
        seller_id: seller,
        order_id: order,
        kind,
        commission: Money::from_units(units),
    }
}

#[tokio::test]
#[serial]
async fn first_posting_creates_wallet() {
    let store = get_test_store().await;
    let seller = SellerId::new();
    let order = OrderId::new();

    let outcome = store
        .post(entry(seller, order, TransactionType::CommissionCreated, 100))
        .await
        .unwrap();
    let (wallet, transaction) = match outcome {
        PostOutcome::Applied {
            wallet,
            transaction,
        } => (wallet, transaction),
        other => panic!("expected applied posting, got {other:?}"),
    };

    assert_eq!(wallet.pending_balance, Money::from_units(100));
    assert_eq!(transaction.order_id, Some(order));
    assert!(transaction.balance_before.is_zero());
    assert_eq!(transaction.balance_after, Money::from_units(100));

    let loaded = store.wallet(seller).await.unwrap().unwrap();
    assert_eq!(loaded.id, wallet.id);
    assert_eq!(loaded.pending_balance, Money::from_units(100));
}

#[tokio::test]
#[serial]
async fn duplicate_posting_is_a_no_op() {
    let store = get_test_store().await;
    let seller = SellerId::new();
    let order = OrderId::new();

    store
        .post(entry(seller, order, TransactionType::CommissionCreated, 100))
        .await
        .unwrap();
    let again = store
        .post(entry(seller, order, TransactionType::CommissionCreated, 100))
        .await
        .unwrap();

    assert!(matches!(again, PostOutcome::Duplicate { .. }));
    let wallet = store.wallet(seller).await.unwrap().unwrap();
    assert_eq!(wallet.pending_balance, Money::from_units(100));
    assert_eq!(store.transactions(wallet.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn concurrent_redeliveries_post_once() {
    let store = get_test_store().await;
    let seller = SellerId::new();
    let order = OrderId::new();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .post(entry(seller, order, TransactionType::CommissionCreated, 25))
                    .await
            })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        if let PostOutcome::Applied { .. } = handle.await.unwrap().unwrap() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);

    let wallet = store.wallet(seller).await.unwrap().unwrap();
    assert_eq!(wallet.pending_balance, Money::from_units(25));
}

#[tokio::test]
#[serial]
async fn unlock_moves_commission_to_available() {
    let store = get_test_store().await;
    let seller = SellerId::new();
    let order = OrderId::new();

    store
        .post(entry(seller, order, TransactionType::CommissionCreated, 100))
        .await
        .unwrap();
    store
        .post(entry(seller, order, TransactionType::CommissionUnlocked, 100))
        .await
        .unwrap();
    let late = store
        .post(entry(seller, order, TransactionType::Refund, 100))
        .await
        .unwrap();
    assert!(matches!(
        late,
        PostOutcome::Superseded {
            by: TransactionType::CommissionUnlocked,
            ..
        }
    ));

    let wallet = store.wallet(seller).await.unwrap().unwrap();
    assert!(wallet.pending_balance.is_zero());
    assert_eq!(wallet.available_balance, Money::from_units(100));

    let transactions = store.transactions(wallet.id).await.unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[1].kind, TransactionType::CommissionUnlocked);
}

#[tokio::test]
#[serial]
async fn refund_without_locked_commission_changes_nothing() {
    let store = get_test_store().await;
    let seller = SellerId::new();

    store
        .post(entry(seller, OrderId::new(), TransactionType::CommissionCreated, 100))
        .await
        .unwrap();
    let outcome = store
        .post(entry(seller, OrderId::new(), TransactionType::Refund, 100))
        .await
        .unwrap();
    assert!(matches!(outcome, PostOutcome::NothingLocked { .. }));

    let wallet = store.wallet(seller).await.unwrap().unwrap();
    assert_eq!(wallet.pending_balance, Money::from_units(100));
    assert_eq!(store.transactions(wallet.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn payout_lifecycle() {
    let store = get_test_store().await;
    let seller = SellerId::new();
    store
        .post(entry(seller, OrderId::new(), TransactionType::CommissionUnlocked, 100))
        .await
        .unwrap();

    let too_much = store
        .create_payout(seller, Money::from_units(150), None)
        .await;
    assert!(matches!(too_much, Err(LedgerError::InsufficientBalance { .. })));

    let payout = store
        .create_payout(seller, Money::from_units(60), Some("first".into()))
        .await
        .unwrap();
    assert_eq!(payout.status, PayoutStatus::Pending);

    let (processed, wallet, transaction) = store.process_payout(payout.id).await.unwrap();
    assert_eq!(processed.status, PayoutStatus::Processed);
    assert!(processed.processed_at.is_some());
    assert_eq!(wallet.available_balance, Money::from_units(40));
    assert_eq!(transaction.kind, TransactionType::PayoutProcessed);
    assert_eq!(transaction.amount, Money::from_units(-60));
    assert_eq!(transaction.payout_id, Some(payout.id));

    let again = store.process_payout(payout.id).await;
    assert!(matches!(
        again,
        Err(LedgerError::InvalidPayoutTransition { .. })
    ));

    let second = store
        .create_payout(seller, Money::from_units(40), None)
        .await
        .unwrap();
    let rejected = store
        .reject_payout(second.id, Some("duplicate request".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, PayoutStatus::Rejected);
    assert_eq!(rejected.notes.as_deref(), Some("duplicate request"));

    let wallet = store.wallet(seller).await.unwrap().unwrap();
    assert_eq!(wallet.available_balance, Money::from_units(40));
    assert_eq!(store.payouts(wallet.id).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn payout_for_unknown_seller_is_not_found() {
    let store = get_test_store().await;
    let result = store
        .create_payout(SellerId::new(), Money::from_units(1), None)
        .await;
    assert!(matches!(result, Err(LedgerError::NotFound(_))));
}
