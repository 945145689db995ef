//! HTTP gateway and order clients against throwaway servers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::Path,
    http::{HeaderMap, StatusCode, header},
    routing::{get, patch, post},
};
use common::{Money, OrderId};
use payments::{
    GatewayOrder, GatewayOrderRequest, HttpOrderClient, HttpPaymentGateway, OrderClient,
    PaymentError, PaymentGateway,
};
use serde_json::{Value, json};

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn create_order(
    headers: HeaderMap,
    Json(request): Json<GatewayOrderRequest>,
) -> Result<Json<GatewayOrder>, StatusCode> {
    // "key:secret" in base64
    let authorization = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    if authorization != Some("Basic a2V5OnNlY3JldA==") {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(GatewayOrder {
        id: "order_gw_1".to_string(),
        amount: request.amount,
        currency: request.currency,
        receipt: Some(request.receipt),
        status: Some("created".to_string()),
        notes: serde_json::to_value(request.notes).unwrap(),
    }))
}

async fn fetch_order(Path(id): Path<String>) -> Json<GatewayOrder> {
    Json(GatewayOrder {
        id,
        amount: 1000,
        currency: "INR".to_string(),
        receipt: None,
        status: Some("attempted".to_string()),
        notes: Value::Null,
    })
}

fn gateway_request() -> GatewayOrderRequest {
    GatewayOrderRequest {
        amount: 100_000,
        currency: "INR".to_string(),
        receipt: "rcpt-1".to_string(),
        notes: HashMap::from([("orderId".to_string(), "o-1".to_string())]),
    }
}

#[tokio::test]
async fn gateway_creates_and_fetches_orders_with_basic_auth() {
    let addr = spawn(
        Router::new()
            .route("/v1/orders", post(create_order))
            .route("/v1/orders/{id}", get(fetch_order)),
    )
    .await;

    let gateway =
        HttpPaymentGateway::new(format!("http://{addr}"), "key", "secret", Duration::from_secs(5))
            .unwrap();
    let created = gateway.create_order(&gateway_request()).await.unwrap();
    assert_eq!(created.id, "order_gw_1");
    assert_eq!(created.notes["orderId"], "o-1");

    let fetched = gateway.fetch_order("order_gw_1").await.unwrap();
    assert_eq!(fetched.id, "order_gw_1");

    let wrong_key =
        HttpPaymentGateway::new(format!("http://{addr}"), "key", "nope", Duration::from_secs(5))
            .unwrap();
    assert!(matches!(
        wrong_key.create_order(&gateway_request()).await,
        Err(PaymentError::Upstream(_))
    ));
}

#[tokio::test]
async fn order_client_marks_paid_and_reads_snapshot() {
    async fn update_status(
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if body["status"] != "PAID" {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad status"})));
        }
        (
            StatusCode::OK,
            Json(json!({
                "id": id,
                "orderNumber": "ORD-20240101-0000000A",
                "userId": OrderId::new(),
                "sellerId": OrderId::new(),
                "status": "PAID",
                "totalAmount": "1000.00",
                "commission": "100.00",
                "currency": "INR",
                "items": []
            })),
        )
    }

    let addr = spawn(
        Router::new()
            .route("/orders/{id}/status", patch(update_status))
            .route(
                "/orders/{id}",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))) }),
            ),
    )
    .await;

    let client = HttpOrderClient::new(format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
    let order_id = OrderId::new();

    let snapshot = client.mark_paid(order_id, "Payment captured").await.unwrap();
    assert_eq!(snapshot.id, order_id);
    assert_eq!(snapshot.commission, Money::from_units(100));
    assert!(snapshot.seller_id.is_some());

    assert!(matches!(
        client.get_order(order_id).await,
        Err(PaymentError::Upstream(_))
    ));
}
