//! Payment service behaviour against in-memory collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{Currency, Money, OrderId, SellerId};
use event_bus::{EventBus, EventEnvelope, InMemoryBroker, Topology};
use payments::{
    CreateGatewayOrder, CreatePayment, InMemoryPaymentGateway, InMemoryPaymentRepository,
    OrderClient, OrderSnapshot, PaymentError, PaymentService, PaymentStatus, signature,
};
use serde_json::json;

const SECRET: &str = "whsec_test";
const OBSERVER: &str = "payments.observer";

struct FakeOrders {
    seller_id: SellerId,
    mark_paid_calls: AtomicUsize,
    reject_mark_paid: AtomicBool,
    down: AtomicBool,
}

impl FakeOrders {
    fn new() -> Self {
        Self {
            seller_id: SellerId::new(),
            mark_paid_calls: AtomicUsize::new(0),
            reject_mark_paid: AtomicBool::new(false),
            down: AtomicBool::new(false),
        }
    }

    fn snapshot(&self, order_id: OrderId, status: &str) -> OrderSnapshot {
        OrderSnapshot {
            id: order_id,
            order_number: Some("ORD-20240101-ABCDEF12".to_string()),
            seller_id: Some(self.seller_id),
            total_amount: Money::from_units(1000),
            commission: Money::from_units(100),
            currency: Currency::default(),
            status: status.to_string(),
        }
    }
}

#[async_trait]
impl OrderClient for FakeOrders {
    async fn mark_paid(&self, order_id: OrderId, _notes: &str) -> payments::Result<OrderSnapshot> {
        self.mark_paid_calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) || self.reject_mark_paid.load(Ordering::SeqCst) {
            return Err(PaymentError::Upstream("order service returned 409".to_string()));
        }
        Ok(self.snapshot(order_id, "PAID"))
    }

    async fn get_order(&self, order_id: OrderId) -> payments::Result<OrderSnapshot> {
        if self.down.load(Ordering::SeqCst) {
            return Err(PaymentError::Upstream("connection refused".to_string()));
        }
        Ok(self.snapshot(order_id, "PAID"))
    }
}

struct Harness {
    service: PaymentService,
    repository: InMemoryPaymentRepository,
    gateway: InMemoryPaymentGateway,
    orders: Arc<FakeOrders>,
    broker: InMemoryBroker,
}

impl Harness {
    async fn new(secret: Option<&str>) -> Self {
        let broker = InMemoryBroker::new();
        let bus = EventBus::new(Arc::new(broker.clone()), "ecommerce.events");
        bus.declare(&Topology::new("ecommerce.events", OBSERVER).bind("payment.*"))
            .await
            .unwrap();

        let repository = InMemoryPaymentRepository::new();
        let gateway = InMemoryPaymentGateway::new();
        let orders = Arc::new(FakeOrders::new());
        let service = PaymentService::new(
            Arc::new(repository.clone()),
            Arc::new(gateway.clone()),
            orders.clone(),
            bus,
            secret.map(str::to_string),
        );

        Self {
            service,
            repository,
            gateway,
            orders,
            broker,
        }
    }

    async fn published(&self) -> Vec<EventEnvelope> {
        self.broker
            .peek(OBSERVER)
            .await
            .iter()
            .map(|m| EventEnvelope::from_bytes(&m.body).unwrap())
            .collect()
    }

    async fn pending_payment(&self) -> OrderId {
        let order_id = OrderId::new();
        self.service
            .create(CreatePayment {
                order_id,
                amount: Money::from_units(1000),
                currency: None,
                method: Some("card".to_string()),
            })
            .await
            .unwrap();
        order_id
    }
}

fn webhook_body(event: &str, status: &str, order_id: OrderId) -> Vec<u8> {
    let error_description = (status == "failed").then_some("card declined");
    json!({
        "event": event,
        "payload": {"payment": {"entity": {
            "id": "pay_test_1",
            "status": status,
            "notes": {"orderId": order_id.to_string()},
            "error_description": error_description,
        }}}
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn one_payment_per_order() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = h.pending_payment().await;

    let result = h
        .service
        .create(CreatePayment {
            order_id,
            amount: Money::from_units(1000),
            currency: None,
            method: None,
        })
        .await;

    assert!(matches!(result, Err(PaymentError::Conflict(_))));
    assert_eq!(h.repository.payment_count().await, 1);

    let payment = h.service.get_by_order(order_id).await.unwrap();
    let logs = h.service.logs(payment.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "initiated");
}

#[tokio::test]
async fn gateway_order_creation_is_idempotent() {
    let h = Harness::new(Some(SECRET)).await;
    let request = CreateGatewayOrder {
        order_id: OrderId::new(),
        amount: Money::from_minor(100_050),
        currency: None,
        method: None,
    };

    let first = h.service.create_gateway_order(request.clone()).await.unwrap();
    let second = h.service.create_gateway_order(request).await.unwrap();

    assert_eq!(first.gateway_order.id, second.gateway_order.id);
    assert_eq!(first.gateway_order.amount, 100_050);
    assert_eq!(
        second.payment.gateway_order_id.as_deref(),
        Some(first.gateway_order.id.as_str())
    );
    assert_eq!(h.gateway.created_count(), 1);
    assert_eq!(h.repository.payment_count().await, 1);
}

#[tokio::test]
async fn gateway_order_survives_webhooks() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = OrderId::new();
    let request = CreateGatewayOrder {
        order_id,
        amount: Money::from_units(1000),
        currency: None,
        method: None,
    };

    let first = h.service.create_gateway_order(request.clone()).await.unwrap();

    let body = webhook_body("payment.authorized", "authorized", order_id);
    let payment = h
        .service
        .handle_webhook(&body, Some(&signature::sign(SECRET, &body).unwrap()))
        .await
        .unwrap();
    assert_eq!(payment.gateway_id.as_deref(), Some("pay_test_1"));
    assert_eq!(
        payment.gateway_order_id.as_deref(),
        Some(first.gateway_order.id.as_str())
    );

    let second = h.service.create_gateway_order(request).await.unwrap();
    assert_eq!(second.gateway_order.id, first.gateway_order.id);
    assert_eq!(second.payment.gateway_id.as_deref(), Some("pay_test_1"));
    assert_eq!(h.gateway.created_count(), 1);
}

#[tokio::test]
async fn gateway_failure_marks_payment_failed() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = OrderId::new();
    let request = CreateGatewayOrder {
        order_id,
        amount: Money::from_units(250),
        currency: None,
        method: None,
    };

    h.gateway.set_fail_on_create(true);
    let result = h.service.create_gateway_order(request.clone()).await;
    assert!(matches!(result, Err(PaymentError::Upstream(_))));

    let payment = h.service.get_by_order(order_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.gateway_order_id.is_none());
    assert!(payment.failure_reason.is_some());

    h.gateway.set_fail_on_create(false);
    let retried = h.service.create_gateway_order(request).await.unwrap();
    assert_eq!(retried.payment.id, payment.id);
    assert_eq!(retried.payment.status, PaymentStatus::Pending);
    assert!(retried.payment.failure_reason.is_none());
    assert_eq!(h.repository.payment_count().await, 1);
}

#[tokio::test]
async fn tampered_webhook_is_rejected_without_persistence() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = h.pending_payment().await;

    let body = webhook_body("payment.captured", "captured", order_id);
    let signature = signature::sign(SECRET, &body).unwrap();
    let mut tampered = body.clone();
    tampered.extend_from_slice(b" ");

    let result = h.service.handle_webhook(&tampered, Some(&signature)).await;
    assert!(matches!(result, Err(PaymentError::Authentication(_))));

    let payment = h.service.get_by_order(order_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(h.service.logs(payment.id).await.unwrap().len(), 1);
    assert!(h.published().await.is_empty());

    let resigned = signature::sign(SECRET, &tampered).unwrap();
    let payment = h.service.handle_webhook(&tampered, Some(&resigned)).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
}

#[tokio::test]
async fn missing_signature_is_rejected_when_secret_configured() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = h.pending_payment().await;

    let result = h
        .service
        .handle_webhook(&webhook_body("payment.captured", "captured", order_id), None)
        .await;
    assert!(matches!(result, Err(PaymentError::Authentication(_))));
}

#[tokio::test]
async fn unsigned_webhook_is_accepted_without_secret() {
    let h = Harness::new(None).await;
    let order_id = h.pending_payment().await;

    let payment = h
        .service
        .handle_webhook(&webhook_body("payment.captured", "captured", order_id), None)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
}

#[tokio::test]
async fn captured_webhook_marks_order_paid_and_publishes_success() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = h.pending_payment().await;
    let body = webhook_body("payment.captured", "captured", order_id);

    let payment = h
        .service
        .handle_webhook(&body, Some(&signature::sign(SECRET, &body).unwrap()))
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.gateway_id.as_deref(), Some("pay_test_1"));
    assert!(payment.gateway_response.is_some());
    assert_eq!(h.orders.mark_paid_calls.load(Ordering::SeqCst), 1);

    let events = h.published().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "PAYMENT_SUCCESS");
    assert_eq!(events[0].data["orderId"], order_id.to_string());
    assert_eq!(events[0].data["sellerId"], h.orders.seller_id.to_string());
    let commission: Money = serde_json::from_value(events[0].data["commission"].clone()).unwrap();
    assert_eq!(commission, Money::from_units(100));

    let logs = h.service.logs(payment.id).await.unwrap();
    assert_eq!(logs.last().unwrap().action, "webhook_received");
}

#[tokio::test]
async fn redelivered_webhook_is_last_write_and_republishes() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = h.pending_payment().await;
    let body = webhook_body("payment.captured", "captured", order_id);
    let signature = signature::sign(SECRET, &body).unwrap();

    h.service.handle_webhook(&body, Some(&signature)).await.unwrap();
    h.orders.reject_mark_paid.store(true, Ordering::SeqCst);
    let payment = h.service.handle_webhook(&body, Some(&signature)).await.unwrap();

    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(h.repository.payment_count().await, 1);
    assert_eq!(h.published().await.len(), 2);
}

#[tokio::test]
async fn unreachable_order_service_does_not_roll_back_payment() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = h.pending_payment().await;
    h.orders.down.store(true, Ordering::SeqCst);
    let body = webhook_body("payment.captured", "captured", order_id);

    let payment = h
        .service
        .handle_webhook(&body, Some(&signature::sign(SECRET, &body).unwrap()))
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(
        h.service.get_by_order(order_id).await.unwrap().status,
        PaymentStatus::Success
    );
    assert!(h.published().await.is_empty());
}

#[tokio::test]
async fn failed_webhook_publishes_failure() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = h.pending_payment().await;
    let body = webhook_body("payment.failed", "failed", order_id);

    let payment = h
        .service
        .handle_webhook(&body, Some(&signature::sign(SECRET, &body).unwrap()))
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.failure_reason.as_deref(), Some("card declined"));
    assert_eq!(h.orders.mark_paid_calls.load(Ordering::SeqCst), 0);

    let events = h.published().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "PAYMENT_FAILED");
}

#[tokio::test]
async fn authorized_webhook_publishes_nothing() {
    let h = Harness::new(Some(SECRET)).await;
    let order_id = h.pending_payment().await;
    let body = webhook_body("payment.authorized", "authorized", order_id);

    let payment = h
        .service
        .handle_webhook(&body, Some(&signature::sign(SECRET, &body).unwrap()))
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Processing);
    assert!(h.published().await.is_empty());
}

#[tokio::test]
async fn webhook_for_unknown_order_is_not_found() {
    let h = Harness::new(Some(SECRET)).await;
    let body = webhook_body("payment.captured", "captured", OrderId::new());

    let result = h
        .service
        .handle_webhook(&body, Some(&signature::sign(SECRET, &body).unwrap()))
        .await;

    assert!(matches!(result, Err(PaymentError::NotFound(_))));
    assert_eq!(h.repository.payment_count().await, 0);
}
