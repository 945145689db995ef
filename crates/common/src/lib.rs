//! Shared types used across the order, payment and ledger services.

pub mod ids;
pub mod money;

pub use ids::{OrderId, PaymentId, PayoutId, ProductId, SellerId, UserId, WalletId};
pub use money::{Currency, Money};
