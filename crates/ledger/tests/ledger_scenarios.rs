//! Ledger behaviour driven through the event bus and the service API.

use std::sync::Arc;

use common::{Money, OrderId, SellerId};
use event_bus::{EventBus, InMemoryBroker, keys};
use ledger::{
    InMemoryLedgerStore, LedgerConsumer, LedgerError, LedgerService, PayoutStatus, PostOutcome,
    TransactionType, topology,
};
use serde_json::json;

const EXCHANGE: &str = "ecommerce.events";
const QUEUE: &str = "ledger.events";

struct Harness {
    service: LedgerService,
    consumer: LedgerConsumer,
    bus: EventBus,
    broker: InMemoryBroker,
    store: InMemoryLedgerStore,
}

impl Harness {
    async fn new() -> Self {
        let broker = InMemoryBroker::new();
        let bus = EventBus::new(Arc::new(broker.clone()), EXCHANGE);
        bus.declare(&topology(EXCHANGE, QUEUE)).await.unwrap();

        let store = InMemoryLedgerStore::new();
        let service = LedgerService::new(Arc::new(store.clone()), bus.clone());
        Self {
            consumer: LedgerConsumer::new(service.clone()),
            service,
            bus,
            broker,
            store,
        }
    }

    async fn publish_payment_success(&self, seller: SellerId, order: OrderId, commission: i64) {
        let published = self
            .bus
            .publish(
                keys::PAYMENT_SUCCESS,
                &json!({
                    "paymentId": uuid::Uuid::new_v4(),
                    "orderId": order,
                    "sellerId": seller,
                    "amount": "1000",
                    "commission": commission.to_string(),
                    "currency": "INR",
                    "status": "SUCCESS",
                }),
            )
            .await;
        assert!(published);
    }

    async fn publish_order_event(
        &self,
        routing_key: &str,
        seller: Option<SellerId>,
        order: OrderId,
        commission: i64,
    ) {
        let published = self
            .bus
            .publish(
                routing_key,
                &json!({
                    "orderId": order,
                    "orderNumber": "ORD-20240101-0000ABCD",
                    "userId": uuid::Uuid::new_v4(),
                    "sellerId": seller,
                    "status": "DELIVERED",
                    "totalAmount": "1000",
                    "commission": commission.to_string(),
                }),
            )
            .await;
        assert!(published);
    }

    async fn drain(&self) -> event_bus::DrainStats {
        self.bus.drain(QUEUE, &self.consumer).await.unwrap()
    }
}

#[tokio::test]
async fn order_to_payout_scenario() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    let order = OrderId::new();

    h.publish_payment_success(seller, order, 100).await;
    h.drain().await;
    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert_eq!(wallet.pending_balance, Money::from_units(100));
    assert!(wallet.available_balance.is_zero());

    h.publish_order_event(keys::ORDER_DELIVERED, Some(seller), order, 100)
        .await;
    h.drain().await;
    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert!(wallet.pending_balance.is_zero());
    assert_eq!(wallet.available_balance, Money::from_units(100));

    let payout = h
        .service
        .create_payout_request(seller, Money::from_units(100), Some("weekly".into()))
        .await
        .unwrap();
    assert_eq!(payout.status, PayoutStatus::Pending);

    let processed = h
        .service
        .update_payout_status(payout.id, PayoutStatus::Processed, None)
        .await
        .unwrap();
    assert_eq!(processed.status, PayoutStatus::Processed);
    assert!(processed.processed_at.is_some());

    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert!(wallet.available_balance.is_zero());

    let transactions = h.service.transactions(seller).await.unwrap();
    let kinds: Vec<TransactionType> = transactions.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TransactionType::CommissionCreated,
            TransactionType::CommissionUnlocked,
            TransactionType::PayoutProcessed,
        ]
    );
    let payout_entry = &transactions[2];
    assert_eq!(payout_entry.amount, Money::from_units(-100));
    assert_eq!(payout_entry.payout_id, Some(payout.id));

    let unlock_entry = &transactions[1];
    assert!(unlock_entry.balance_before.is_zero());
    assert_eq!(unlock_entry.balance_after, Money::from_units(100));

    assert!(h.service.reconcile(seller).await.unwrap().is_balanced());
}

#[tokio::test]
async fn redelivered_events_post_once() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    let order = OrderId::new();

    h.publish_payment_success(seller, order, 100).await;
    h.publish_payment_success(seller, order, 100).await;
    h.publish_order_event(keys::ORDER_DELIVERED, Some(seller), order, 100)
        .await;
    h.publish_order_event(keys::ORDER_DELIVERED, Some(seller), order, 100)
        .await;

    let stats = h.drain().await;
    assert_eq!(stats.acked, 4);
    assert_eq!(stats.dead_lettered, 0);

    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert!(wallet.pending_balance.is_zero());
    assert_eq!(wallet.available_balance, Money::from_units(100));
    assert_eq!(h.store.transaction_count().await, 2);
}

#[tokio::test]
async fn cancellation_refunds_pending_commission() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    let kept = OrderId::new();
    let cancelled = OrderId::new();

    h.publish_payment_success(seller, kept, 40).await;
    h.publish_payment_success(seller, cancelled, 60).await;
    h.publish_order_event(keys::ORDER_CANCELLED, Some(seller), cancelled, 60)
        .await;
    h.drain().await;

    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert_eq!(wallet.pending_balance, Money::from_units(40));

    let refund = h
        .service
        .transactions(seller)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.kind == TransactionType::Refund)
        .unwrap();
    assert_eq!(refund.amount, Money::from_units(-60));
    assert_eq!(refund.order_id, Some(cancelled));
}

#[tokio::test]
async fn pending_balance_never_goes_negative() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    let paid = OrderId::new();

    h.publish_payment_success(seller, paid, 30).await;
    // Cancellation carrying more commission than was locked.
    h.publish_order_event(keys::ORDER_CANCELLED, Some(seller), paid, 50)
        .await;
    h.drain().await;

    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert!(wallet.pending_balance.is_zero());
    let refund = h.service.transactions(seller).await.unwrap().pop().unwrap();
    assert_eq!(refund.kind, TransactionType::Refund);
    assert_eq!(refund.amount, Money::from_units(-30));
    assert!(h.service.reconcile(seller).await.unwrap().is_balanced());
}

#[tokio::test]
async fn cancelling_unpaid_order_keeps_other_commission_locked() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    let paid = OrderId::new();
    let unpaid = OrderId::new();

    h.service
        .on_payment_success(seller, paid, Money::from_units(100))
        .await
        .unwrap();
    let outcome = h
        .service
        .on_order_cancelled(seller, unpaid, Money::from_units(100))
        .await
        .unwrap();

    assert!(matches!(outcome, PostOutcome::NothingLocked { .. }));
    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert_eq!(wallet.pending_balance, Money::from_units(100));
    assert_eq!(h.store.transaction_count().await, 1);

    // The same cancellation through the bus is acknowledged and changes nothing.
    h.publish_order_event(keys::ORDER_CANCELLED, Some(seller), unpaid, 100)
        .await;
    let stats = h.drain().await;
    assert_eq!(stats.acked, 1);
    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert_eq!(wallet.pending_balance, Money::from_units(100));
}

#[tokio::test]
async fn late_payment_after_delivery_is_ignored() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    let order = OrderId::new();

    h.service
        .on_order_delivered(seller, order, Money::from_units(100))
        .await
        .unwrap();
    let outcome = h
        .service
        .on_payment_success(seller, order, Money::from_units(100))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        PostOutcome::Superseded {
            by: TransactionType::CommissionUnlocked,
            ..
        }
    ));
    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert!(wallet.pending_balance.is_zero());
    assert_eq!(wallet.available_balance, Money::from_units(100));
}

#[tokio::test]
async fn events_without_commission_are_skipped() {
    let h = Harness::new().await;
    let seller = SellerId::new();

    h.publish_order_event(keys::ORDER_DELIVERED, None, OrderId::new(), 100)
        .await;
    h.publish_payment_success(seller, OrderId::new(), 0).await;

    let stats = h.drain().await;
    assert_eq!(stats.acked, 2);
    assert!(matches!(
        h.service.get_wallet(seller).await,
        Err(LedgerError::NotFound(_))
    ));
}

#[tokio::test]
async fn malformed_event_is_dead_lettered() {
    let h = Harness::new().await;
    assert!(
        h.bus
            .publish(keys::PAYMENT_SUCCESS, &json!({"commission": "oops"}))
            .await
    );

    let stats = h.drain().await;
    assert_eq!(stats.dead_lettered, 1);

    let dead = h.broker.peek("ledger.events.dlq").await;
    assert_eq!(dead.len(), 1);
    let record = dead[0].death_record().unwrap();
    assert_eq!(record.routing_key, keys::PAYMENT_SUCCESS);
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn payout_cannot_exceed_available_balance() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    let order = OrderId::new();

    h.service
        .on_payment_success(seller, order, Money::from_units(100))
        .await
        .unwrap();

    // Pending commission is not withdrawable.
    let result = h
        .service
        .create_payout_request(seller, Money::from_units(50), None)
        .await;
    assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));

    h.service
        .on_order_delivered(seller, order, Money::from_units(100))
        .await
        .unwrap();
    let result = h
        .service
        .create_payout_request(seller, Money::from_units(101), None)
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::InsufficientBalance { requested, available })
            if requested == Money::from_units(101) && available == Money::from_units(100)
    ));
}

#[tokio::test]
async fn approval_rechecks_balance() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    let order = OrderId::new();
    h.service
        .on_order_delivered(seller, order, Money::from_units(100))
        .await
        .unwrap();

    let first = h
        .service
        .create_payout_request(seller, Money::from_units(80), None)
        .await
        .unwrap();
    let second = h
        .service
        .create_payout_request(seller, Money::from_units(80), None)
        .await
        .unwrap();

    h.service
        .update_payout_status(first.id, PayoutStatus::Processed, None)
        .await
        .unwrap();
    let result = h
        .service
        .update_payout_status(second.id, PayoutStatus::Processed, None)
        .await;
    assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));

    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert_eq!(wallet.available_balance, Money::from_units(20));
    let still_pending = h.service.payout_requests(seller).await.unwrap();
    assert!(
        still_pending
            .iter()
            .any(|p| p.id == second.id && p.status == PayoutStatus::Pending)
    );
}

#[tokio::test]
async fn rejected_payout_leaves_balance_untouched() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    h.service
        .on_order_delivered(seller, OrderId::new(), Money::from_units(100))
        .await
        .unwrap();

    let payout = h
        .service
        .create_payout_request(seller, Money::from_units(100), None)
        .await
        .unwrap();
    let rejected = h
        .service
        .update_payout_status(payout.id, PayoutStatus::Rejected, Some("bank details missing".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, PayoutStatus::Rejected);
    assert_eq!(rejected.notes.as_deref(), Some("bank details missing"));

    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert_eq!(wallet.available_balance, Money::from_units(100));

    let result = h
        .service
        .update_payout_status(payout.id, PayoutStatus::Processed, None)
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::InvalidPayoutTransition {
            from: PayoutStatus::Rejected,
            to: PayoutStatus::Processed,
        })
    ));
}

#[tokio::test]
async fn processed_payout_cannot_be_processed_again() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    h.service
        .on_order_delivered(seller, OrderId::new(), Money::from_units(100))
        .await
        .unwrap();
    let payout = h
        .service
        .create_payout_request(seller, Money::from_units(30), None)
        .await
        .unwrap();

    h.service
        .update_payout_status(payout.id, PayoutStatus::Processed, None)
        .await
        .unwrap();
    let again = h
        .service
        .update_payout_status(payout.id, PayoutStatus::Processed, None)
        .await;
    assert!(matches!(
        again,
        Err(LedgerError::InvalidPayoutTransition { .. })
    ));

    let wallet = h.service.get_wallet(seller).await.unwrap();
    assert_eq!(wallet.available_balance, Money::from_units(70));
}

#[tokio::test]
async fn ledger_reconciles_after_mixed_activity() {
    let h = Harness::new().await;
    let seller = SellerId::new();
    let orders: Vec<OrderId> = (0..5).map(|_| OrderId::new()).collect();

    for (i, order) in orders.iter().enumerate() {
        h.publish_payment_success(seller, *order, 10 * (i as i64 + 1))
            .await;
    }
    h.publish_order_event(keys::ORDER_DELIVERED, Some(seller), orders[0], 10)
        .await;
    h.publish_order_event(keys::ORDER_DELIVERED, Some(seller), orders[2], 30)
        .await;
    h.publish_order_event(keys::ORDER_CANCELLED, Some(seller), orders[4], 50)
        .await;
    h.publish_payment_success(seller, orders[1], 20).await;
    h.drain().await;

    let report = h.service.reconcile(seller).await.unwrap();
    assert!(report.is_balanced());
    assert_eq!(report.transaction_count, 8);
    assert_eq!(report.pending_balance, Money::from_units(60));
    assert_eq!(report.available_balance, Money::from_units(40));
}
