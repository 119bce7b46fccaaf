use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use backoffice::api;
use backoffice::domain::aggregates::{OrderStatus, PaymentStatus};
use backoffice::notify::{MessageComposer, RecordingNotifier};
use backoffice::store::MemoryStore;
use backoffice::OrderWorkflow;

fn app() -> (Router, MemoryStore, RecordingNotifier) {
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::new();
    let customer = store.add_customer("Maria Santos", "maria@example.com");
    store.seed_order(42, customer, Some(dec!(1500.00)), OrderStatus::Processing);
    store.seed_order(7, customer, Some(dec!(800.00)), OrderStatus::Cancelled);
    store.seed_order(9, customer, Some(dec!(2450.00)), OrderStatus::Pending);

    let composer = MessageComposer::new("Threadline");
    let workflow = OrderWorkflow::new(store.clone(), notifier.clone(), composer);
    (api::router(Arc::new(workflow), None), store, notifier)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> { Request::builder().uri(uri).body(Body::empty()).unwrap() }

#[tokio::test]
async fn health_check() {
    let (app, _, _) = app();
    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn status_update_returns_success_flash() {
    let (app, store, notifier) = app();
    let request = post_json("/api/v1/admin/orders/42/status", json!({"status": "shipped"}));
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "success");
    assert_eq!(body["message"], "Order #42 status updated to shipped");
    assert_eq!(body["data"]["to"], "shipped");
    assert_eq!(store.snapshot().orders[&42].status, OrderStatus::Shipped);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn terminal_violation_is_a_conflict() {
    let (app, store, notifier) = app();
    let request = post_json("/api/v1/admin/orders/7/status", json!({"status": "processing"}));
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "error");
    assert_eq!(body["message"], "Order #7 is cancelled and cannot be changed to processing");
    assert!(store.snapshot().history_for(7).is_empty());
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn invalid_status_is_a_bad_request() {
    let (app, _, _) = app();
    let request = post_json("/api/v1/admin/orders/42/status", json!({"status": "teleported"}));
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "error");
}

#[tokio::test]
async fn pickup_without_location_is_unprocessable() {
    let (app, store, _) = app();
    let request = post_json("/api/v1/admin/orders/42/fulfillment", json!({"mode": "pickup"}));
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "Missing required field: location");
    assert!(store.snapshot().shipping.is_empty());
}

#[tokio::test]
async fn order_detail_and_not_found() {
    let (app, _, _) = app();
    let (status, body) = send(app.clone(), get("/api/v1/admin/orders/9")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["id"], 9);
    assert_eq!(body["order"]["status"], "pending");

    let (status, body) = send(app, get("/api/v1/admin/orders/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Order #999 not found");
}

#[tokio::test]
async fn payment_form_action_records_payment() {
    let (app, store, _) = app();
    let (status, body) = send(
        app,
        post_form(
            "/api/v1/admin/orders/9/actions",
            "action=record_payment&method=gcash&payment_status=completed&transaction_id=GC-1",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment recorded for order #9");
    let data = store.snapshot();
    let payments = data.payments_for(9);
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Completed);
    assert_eq!(payments[0].amount, dec!(2450.00));
    assert_eq!(data.orders[&9].status, OrderStatus::Processing);
}

#[tokio::test]
async fn delivery_form_action_schedules_delivery() {
    let (app, store, _) = app();
    let (status, body) = send(
        app,
        post_form(
            "/api/v1/admin/orders/42/actions",
            "action=schedule_delivery&mode=delivery&date=2024-06-03&carrier=LBC&tracking_number=",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Delivery scheduled for order #42");
    let shipping = &store.snapshot().shipping[&42];
    assert_eq!(shipping.carrier.as_deref(), Some("LBC"));
    assert_eq!(shipping.tracking_number, None);
}

#[tokio::test]
async fn unknown_form_action_is_rejected() {
    let (app, _, _) = app();
    let request = post_form("/api/v1/admin/orders/42/actions", "action=teleport");
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "error");
}

#[tokio::test]
async fn cancel_endpoint_requires_reason() {
    let (app, store, _) = app();
    let request = post_json("/api/v1/admin/orders/42/cancel", json!({}));
    let (status, _) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let request = post_json("/api/v1/admin/orders/42/cancel", json!({"reason": "Out of stock"}));
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Order #42 cancelled");
    assert_eq!(store.snapshot().orders[&42].cancellation_reason.as_deref(), Some("Out of stock"));
}

#[tokio::test]
async fn catalog_routes_need_a_database() {
    let (app, _, _) = app();
    let (status, _) = send(app, get("/api/v1/admin/products")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
