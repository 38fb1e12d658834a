mod common;

use common::{captured_event, failed_event, sign, TestApp, TestOptions, KEY_SECRET};
use healthupi_payments::models::OrderStatus;
use reqwest::StatusCode;

#[tokio::test]
async fn captured_event_marks_order_paid_once() {
    let app = TestApp::spawn().await;
    app.seed_order("ord_1", 50_000).await;

    let response = app.post_signed_webhook(&captured_event("ord_1", "pay_abc")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let order = app.order("ord_1").await;
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_id.as_deref(), Some("pay_abc"));
    assert_eq!(app.entitlements.calls(), 1);
    assert_eq!(app.notifier.calls(), 1);

    // Razorpay redelivers the same event.
    let response = app.post_signed_webhook(&captured_event("ord_1", "pay_abc")).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(app.order("ord_1").await.status, OrderStatus::Paid);
    assert_eq!(app.store.status_writes(), 1);
    assert_eq!(app.entitlements.calls(), 1);
    assert_eq!(app.notifier.calls(), 1);
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_apply_once() {
    let app = TestApp::spawn().await;
    app.seed_order("ord_1", 50_000).await;

    let body = captured_event("ord_1", "pay_abc");
    let deliveries = (0..5).map(|_| app.post_signed_webhook(&body));
    for response in futures::future::join_all(deliveries).await {
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(app.order("ord_1").await.status, OrderStatus::Paid);
    assert_eq!(app.store.status_writes(), 1);
    assert_eq!(app.entitlements.calls(), 1);
    assert_eq!(app.notifier.calls(), 1);
}

#[tokio::test]
async fn failed_then_captured_ends_paid() {
    let app = TestApp::spawn().await;
    app.seed_order("ord_2", 50_000).await;

    let response = app.post_signed_webhook(&failed_event("ord_2")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.order("ord_2").await;
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(app.entitlements.calls(), 0);
    assert_eq!(app.notifier.calls(), 0);

    let response = app.post_signed_webhook(&captured_event("ord_2", "pay_late")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.order("ord_2").await;
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_id.as_deref(), Some("pay_late"));
    assert_eq!(app.entitlements.calls(), 1);
}

#[tokio::test]
async fn unrecognized_event_is_acknowledged_without_mutation() {
    let app = TestApp::spawn().await;
    app.seed_order("ord_1", 50_000).await;

    let body = serde_json::json!({
        "entity": "event",
        "event": "refund.created",
        "payload": { "refund": { "entity": { "id": "rfnd_1", "payment_id": "pay_abc" } } }
    })
    .to_string();

    let response = app.post_signed_webhook(&body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order("ord_1").await.status, OrderStatus::Created);
    assert_eq!(app.store.status_writes(), 0);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let app = TestApp::spawn().await;
    app.seed_order("ord_1", 50_000).await;

    let response = app.post_webhook(&captured_event("ord_1", "pay_abc"), None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("signature"));
    assert_eq!(app.order("ord_1").await.status, OrderStatus::Created);
}

#[tokio::test]
async fn invalid_signature_is_rejected_without_mutation() {
    let app = TestApp::spawn().await;
    app.seed_order("ord_1", 50_000).await;
    let body = captured_event("ord_1", "pay_abc");

    // Signed with the wrong secret.
    let response = app.post_webhook(&body, Some(&sign(KEY_SECRET, &body))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Signed correctly, then mutated.
    let signature = sign(common::WEBHOOK_SECRET, &body);
    let tampered = body.replace("pay_abc", "pay_evil");
    let response = app.post_webhook(&tampered, Some(&signature)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Not hex at all.
    let response = app.post_webhook(&body, Some("sha256=nope")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.order("ord_1").await.status, OrderStatus::Created);
    assert_eq!(app.entitlements.calls(), 0);
}

#[tokio::test]
async fn signed_but_malformed_payload_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app.post_signed_webhook("{\"event\": ").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn event_for_unknown_order_is_acknowledged() {
    let app = TestApp::spawn().await;

    let response = app
        .post_signed_webhook(&captured_event("ord_never_created", "pay_abc"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.entitlements.calls(), 0);
}

#[tokio::test]
async fn store_failure_requests_redelivery() {
    let app = TestApp::spawn_with(TestOptions {
        broken_writes: true,
        ..Default::default()
    })
    .await;
    app.seed_order("ord_1", 50_000).await;

    let response = app.post_signed_webhook(&captured_event("ord_1", "pay_abc")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app.post_signed_webhook(&failed_event("ord_1")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(app.order("ord_1").await.status, OrderStatus::Created);
    assert_eq!(app.entitlements.calls(), 0);
    assert_eq!(app.notifier.calls(), 0);
}

#[tokio::test]
async fn notification_failure_still_acknowledges() {
    let app = TestApp::spawn_with(TestOptions {
        failing_notifier: true,
        ..Default::default()
    })
    .await;
    app.seed_order("ord_1", 50_000).await;

    let response = app.post_signed_webhook(&captured_event("ord_1", "pay_abc")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order("ord_1").await.status, OrderStatus::Paid);
    assert_eq!(app.notifier.calls(), 1);
    assert_eq!(app.entitlements.calls(), 1);
}
