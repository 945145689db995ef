//! Posting rules: how each ledger entry moves a wallet's balances.
//!
//! Rules are pure; stores apply them inside one transaction together with
//! the entry they produce.

use common::Money;

use crate::{Balances, LedgerError, Result, TransactionType};

/// A computed ledger entry and the balances it leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub kind: TransactionType,
    /// Signed delta recorded on the entry.
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub balances: Balances,
}

/// Locks commission in the pending bucket.
pub fn commission_created(balances: Balances, commission: Money) -> Posting {
    let pending = balances.pending + commission;
    Posting {
        kind: TransactionType::CommissionCreated,
        amount: commission,
        balance_before: balances.pending,
        balance_after: pending,
        balances: Balances {
            pending,
            available: balances.available,
        },
    }
}

/// Moves commission from pending to available.
///
/// Pending is floored at zero. The entry is recorded against the available
/// bucket, the one being credited.
pub fn commission_unlocked(balances: Balances, commission: Money) -> Posting {
    let available = balances.available + commission;
    Posting {
        kind: TransactionType::CommissionUnlocked,
        amount: commission,
        balance_before: balances.available,
        balance_after: available,
        balances: Balances {
            pending: (balances.pending - commission).floor_zero(),
            available,
        },
    }
}

/// Releases locked commission of a cancelled order.
///
/// Pending is floored at zero; the recorded amount is the delta actually
/// applied, `-commission` unless the floor was hit.
pub fn refund(balances: Balances, commission: Money) -> Posting {
    let pending = (balances.pending - commission).floor_zero();
    Posting {
        kind: TransactionType::Refund,
        amount: pending - balances.pending,
        balance_before: balances.pending,
        balance_after: pending,
        balances: Balances {
            pending,
            available: balances.available,
        },
    }
}

/// Debits an approved payout from the available bucket.
pub fn payout_processed(balances: Balances, amount: Money) -> Result<Posting> {
    if amount > balances.available {
        return Err(LedgerError::InsufficientBalance {
            requested: amount,
            available: balances.available,
        });
    }
    let available = balances.available - amount;
    Ok(Posting {
        kind: TransactionType::PayoutProcessed,
        amount: -amount,
        balance_before: balances.available,
        balance_after: available,
        balances: Balances {
            pending: balances.pending,
            available,
        },
    })
}

/// Applies an order-driven rule by kind.
pub fn order_posting(
    kind: TransactionType,
    balances: Balances,
    commission: Money,
) -> Result<Posting> {
    match kind {
        TransactionType::CommissionCreated => Ok(commission_created(balances, commission)),
        TransactionType::CommissionUnlocked => Ok(commission_unlocked(balances, commission)),
        TransactionType::Refund => Ok(refund(balances, commission)),
        TransactionType::PayoutProcessed => Err(LedgerError::Validation(
            "payouts are not posted from order events".to_string(),
        )),
    }
}

/// Whether an order event should be posted given the entries already
/// recorded for that order on the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingDecision {
    Apply,
    /// The same entry already exists; the event is a redelivery.
    Duplicate,
    /// A later stage of the order was already posted.
    Superseded(TransactionType),
    /// A refund for an order whose commission was never locked.
    NothingLocked,
}

pub fn decide(kind: TransactionType, prior: &[TransactionType]) -> PostingDecision {
    if prior.contains(&kind) {
        return PostingDecision::Duplicate;
    }
    let later: &[TransactionType] = match kind {
        TransactionType::CommissionCreated => {
            &[TransactionType::CommissionUnlocked, TransactionType::Refund]
        }
        TransactionType::CommissionUnlocked => &[TransactionType::Refund],
        TransactionType::Refund => &[TransactionType::CommissionUnlocked],
        TransactionType::PayoutProcessed => &[],
    };
    if let Some(by) = later.iter().find(|k| prior.contains(k)) {
        return PostingDecision::Superseded(*by);
    }
    if kind == TransactionType::Refund && !prior.contains(&TransactionType::CommissionCreated) {
        return PostingDecision::NothingLocked;
    }
    PostingDecision::Apply
}

/// Replays a wallet's entries, oldest first, and returns the balances they imply.
pub fn replay(entries: impl IntoIterator<Item = (TransactionType, Money)>) -> Balances {
    entries
        .into_iter()
        .fold(Balances::default(), |balances, (kind, amount)| match kind {
            TransactionType::CommissionCreated => Balances {
                pending: balances.pending + amount,
                ..balances
            },
            TransactionType::CommissionUnlocked => Balances {
                pending: (balances.pending - amount).floor_zero(),
                available: balances.available + amount,
            },
            TransactionType::Refund => Balances {
                pending: balances.pending + amount,
                ..balances
            },
            TransactionType::PayoutProcessed => Balances {
                available: balances.available + amount,
                ..balances
            },
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balances(pending: i64, available: i64) -> Balances {
        Balances {
            pending: Money::from_units(pending),
            available: Money::from_units(available),
        }
    }

    #[test]
    fn test_entries_balance_before_plus_amount() {
        let start = balances(30, 70);
        let postings = [
            commission_created(start, Money::from_units(100)),
            commission_unlocked(start, Money::from_units(100)),
            refund(start, Money::from_units(100)),
            payout_processed(start, Money::from_units(70)).unwrap(),
        ];
        for posting in postings {
            assert_eq!(
                posting.balance_before + posting.amount,
                posting.balance_after,
                "{:?}",
                posting.kind
            );
        }
    }

    #[test]
    fn test_unlock_moves_pending_to_available() {
        let posting = commission_unlocked(balances(100, 0), Money::from_units(100));
        assert_eq!(posting.balances, balances(0, 100));
        assert_eq!(posting.balance_before, Money::zero());
        assert_eq!(posting.balance_after, Money::from_units(100));
    }

    #[test]
    fn test_unlock_floors_pending_at_zero() {
        let posting = commission_unlocked(balances(40, 0), Money::from_units(100));
        assert_eq!(posting.balances, balances(0, 100));
    }

    #[test]
    fn test_refund_is_negative_commission() {
        let posting = refund(balances(100, 5), Money::from_units(100));
        assert_eq!(posting.amount, -Money::from_units(100));
        assert_eq!(posting.balances, balances(0, 5));
    }

    #[test]
    fn test_refund_records_only_applied_delta_at_floor() {
        let posting = refund(balances(30, 0), Money::from_units(100));
        assert_eq!(posting.amount, -Money::from_units(30));
        assert_eq!(posting.balances.pending, Money::zero());
    }

    #[test]
    fn test_payout_cannot_overdraw() {
        let result = payout_processed(balances(500, 99), Money::from_units(100));
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));

        let posting = payout_processed(balances(0, 100), Money::from_units(100)).unwrap();
        assert_eq!(posting.amount, -Money::from_units(100));
        assert_eq!(posting.balances.available, Money::zero());
    }

    #[test]
    fn test_decide() {
        use TransactionType::*;
        assert_eq!(decide(CommissionCreated, &[]), PostingDecision::Apply);
        assert_eq!(
            decide(CommissionCreated, &[CommissionCreated]),
            PostingDecision::Duplicate
        );
        assert_eq!(
            decide(CommissionUnlocked, &[CommissionCreated]),
            PostingDecision::Apply
        );
        assert_eq!(
            decide(CommissionCreated, &[CommissionUnlocked]),
            PostingDecision::Superseded(CommissionUnlocked)
        );
        assert_eq!(
            decide(Refund, &[CommissionCreated, CommissionUnlocked]),
            PostingDecision::Superseded(CommissionUnlocked)
        );
        assert_eq!(decide(CommissionUnlocked, &[]), PostingDecision::Apply);
        assert_eq!(decide(Refund, &[]), PostingDecision::NothingLocked);
        assert_eq!(decide(Refund, &[CommissionCreated]), PostingDecision::Apply);
    }

    #[test]
    fn test_pending_never_negative_under_any_sequence() {
        let commission = Money::from_units(100);
        let steps: [fn(Balances, Money) -> Posting; 3] =
            [commission_created, commission_unlocked, refund];

        // Every sequence of up to four steps, duplicates included.
        for a in 0..3 {
            for b in 0..3 {
                for c in 0..3 {
                    for d in 0..3 {
                        let mut current = Balances::default();
                        for step in [a, b, c, d] {
                            current = steps[step](current, commission).balances;
                            assert!(!current.pending.is_negative());
                            assert!(!current.available.is_negative());
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_replay_matches_applied_postings() {
        let mut current = Balances::default();
        let mut entries = Vec::new();
        let postings: [fn(Balances) -> Posting; 4] = [
            |b| commission_created(b, Money::from_units(100)),
            |b| commission_created(b, Money::from_units(40)),
            |b| commission_unlocked(b, Money::from_units(100)),
            |b| refund(b, Money::from_units(60)),
        ];
        for posting in postings {
            let posting = posting(current);
            entries.push((posting.kind, posting.amount));
            current = posting.balances;
        }

        assert_eq!(replay(entries), current);
        assert_eq!(current, balances(0, 100));
    }
}
