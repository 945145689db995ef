//! Seller commission ledger.
//!
//! Each seller has a wallet with a pending and an available balance.
//! Lifecycle events move commission between the two:
//!
//! | Event | Entry | Effect |
//! |---|---|---|
//! | `payment.success` | `COMMISSION_CREATED` | pending += commission |
//! | `order.delivered` | `COMMISSION_UNLOCKED` | pending -= commission (floored at 0), available += commission |
//! | `order.cancelled` | `REFUND` | pending -= commission (floored at 0) |
//! | payout approved | `PAYOUT_PROCESSED` | available -= amount |
//!
//! Every balance change appends an immutable [`WalletTransaction`] in the
//! same atomic step, and order entries are unique per
//! `(wallet, order, type)` so redelivered events post at most once.

pub mod consumer;
pub mod error;
pub mod model;
pub mod postgres;
pub mod posting;
pub mod service;
pub mod store;

pub use consumer::{LEDGER_BINDINGS, LedgerConsumer, topology};
pub use error::{LedgerError, Result};
pub use model::{
    Balances, CommissionEvent, PayoutRequest, PayoutStatus, Reconciliation, TransactionType,
    Wallet, WalletCommissionEvent, WalletTransaction,
};
pub use postgres::PostgresLedgerStore;
pub use service::LedgerService;
pub use store::{InMemoryLedgerStore, LedgerStore, OrderEntry, PostOutcome};
