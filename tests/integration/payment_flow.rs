//! Deposits through the HTTP webhook with real signature verification.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use tickbet::api::build_router;
use tickbet::api::routes::{ApiState, SIGNATURE_HEADER};
use tickbet::engine::{GameEngine, GameSettings};
use tickbet::payments::stripe::{signature_header, StripeGateway};
use tickbet::payments::PaymentIntake;
use tickbet::storage::{AccountStore, SqliteStore};

use crate::doubles::{RecordingNotifier, ScriptedFeed};

const SECRET: &str = "whsec_integration";

struct Harness {
    engine: Arc<GameEngine>,
    store: Arc<dyn AccountStore>,
    notifier: Arc<RecordingNotifier>,
    app: Router,
}

async fn harness() -> Harness {
    let store: Arc<dyn AccountStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
    let engine = Arc::new(GameEngine::new(
        store.clone(),
        Arc::new(ScriptedFeed::new(&[dec!(50000)])),
        GameSettings::default(),
    ));
    let gateway = StripeGateway::new(
        SecretString::new("sk_test_x".into()),
        SecretString::new(SECRET.into()),
        "https://mini.example",
        "eur",
        300,
    )
    .unwrap();
    let payments = Arc::new(PaymentIntake::new(
        Arc::new(gateway),
        store.clone(),
        engine.locks(),
        vec![10, 25, 50, 100],
    ));
    let notifier = Arc::new(RecordingNotifier::default());
    let state = ApiState::new(engine.clone())
        .with_payments(payments)
        .with_notifier(notifier.clone())
        .with_currency("EUR");

    Harness {
        engine,
        store,
        notifier,
        app: build_router(Arc::new(state)),
    }
}

fn session_event(event_id: &str, account_id: &str, amount: &str, payment_status: &str) -> String {
    json!({
        "id": event_id,
        "object": "event",
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": format!("cs_{event_id}"),
            "object": "checkout.session",
            "payment_status": payment_status,
            "metadata": {"telegramId": account_id, "amount": amount}
        }}
    })
    .to_string()
}

async fn deliver(app: &Router, payload: &str, timestamp: i64, secret: &str) -> (StatusCode, Value) {
    let sig = signature_header(secret, timestamp, payload.as_bytes()).unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/webhook/payment")
        .header(SIGNATURE_HEADER, sig)
        .body(Body::from(payload.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn wait_for_notifications(notifier: &RecordingNotifier, n: usize) -> Vec<(String, String)> {
    for _ in 0..50 {
        let sent = notifier.sent();
        if sent.len() >= n {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    notifier.sent()
}

#[tokio::test]
async fn test_deposit_credits_once_and_notifies() {
    let h = harness().await;
    h.engine.start_account("42", "alice").await.unwrap();

    let payload = session_event("evt_100", "42", "25", "paid");
    let now = Utc::now().timestamp();

    let (status, body) = deliver(&h.app, &payload, now, SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": true}));

    // Stripe retries deliver the same event again.
    let (status, _) = deliver(&h.app, &payload, now + 60, SECRET).await;
    assert_eq!(status, StatusCode::OK);

    let account = h.store.get_account("42").await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(125));
    assert!(h.store.is_payment_processed("evt_100").await.unwrap());

    let sent = wait_for_notifications(&h.notifier, 1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "42");
    assert!(sent[0].1.contains("+25.00 EUR"));
    assert!(sent[0].1.contains("125.00 EUR"));
}

#[tokio::test]
async fn test_rejected_deliveries_change_nothing() {
    let h = harness().await;
    h.engine.start_account("42", "alice").await.unwrap();
    let payload = session_event("evt_200", "42", "50", "paid");

    let (status, body) = deliver(&h.app, &payload, Utc::now().timestamp(), "whsec_other").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Signature"));

    let stale = Utc::now().timestamp() - 3600;
    let (status, _) = deliver(&h.app, &payload, stale, SECRET).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let account = h.store.get_account("42").await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(100));
    assert!(!h.store.is_payment_processed("evt_200").await.unwrap());
}

#[tokio::test]
async fn test_unpaid_and_unrelated_events_are_acknowledged() {
    let h = harness().await;
    h.engine.start_account("42", "alice").await.unwrap();
    let now = Utc::now().timestamp();

    let unpaid = session_event("evt_300", "42", "10", "unpaid");
    let (status, _) = deliver(&h.app, &unpaid, now, SECRET).await;
    assert_eq!(status, StatusCode::OK);

    let other = json!({"id": "evt_301", "type": "payment_intent.created", "data": {"object": {}}}).to_string();
    let (status, _) = deliver(&h.app, &other, now, SECRET).await;
    assert_eq!(status, StatusCode::OK);

    let account = h.store.get_account("42").await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(100));
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_unknown_account_can_be_credited_on_redelivery() {
    let h = harness().await;
    let payload = session_event("evt_400", "77", "10", "paid");
    let now = Utc::now().timestamp();

    let (status, _) = deliver(&h.app, &payload, now, SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!h.store.is_payment_processed("evt_400").await.unwrap());

    // The player starts the bot; the processor retries the event.
    h.engine.start_account("77", "late").await.unwrap();
    let (status, _) = deliver(&h.app, &payload, now + 120, SECRET).await;
    assert_eq!(status, StatusCode::OK);

    let account = h.store.get_account("77").await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(110));
}

#[tokio::test]
async fn test_malformed_metadata_is_bad_request() {
    let h = harness().await;
    let payload = json!({
        "id": "evt_500",
        "type": "checkout.session.completed",
        "data": {"object": {"id": "cs_1", "payment_status": "paid", "metadata": {}}}
    })
    .to_string();
    let (status, _) = deliver(&h.app, &payload, Utc::now().timestamp(), SECRET).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
