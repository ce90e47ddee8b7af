//! Payment reconciliation: signature gating at the HTTP boundary and
//! idempotent absorption of at-least-once webhook delivery.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{order_request, TestHarness};
use grocerly_api::entities::order::{Entity as Order, FulfillmentStatus, PaymentStatus};
use grocerly_api::services::notifications::NotificationKind;
use grocerly_api::services::orders::ReconciliationOutcome;
use hmac::{Hmac, Mac};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

async fn place_order(h: &TestHarness) -> (String, String) {
    let zone = h.seed_zone("N1", dec!(2.99), dec!(0)).await;
    let slot = h.seed_slot(10).await;
    let basket = h.seed_product("Veg Box", dec!(25)).await;
    let placed = h
        .services
        .orders
        .create_order(order_request(
            "hook@example.com",
            "N1 1AA",
            zone.id,
            slot.id,
            vec![(basket.id, 1)],
            None,
        ))
        .await
        .unwrap();
    (placed.order.order_number.clone(), placed.payment_ref)
}

#[tokio::test]
async fn first_delivery_confirms_and_replay_is_absorbed() {
    let h = TestHarness::new().await;
    let (order_number, payment_ref) = place_order(&h).await;

    let first = h
        .services
        .orders
        .confirm_payment(&payment_ref)
        .await
        .unwrap();
    assert_eq!(
        first,
        ReconciliationOutcome::Confirmed {
            order_number: order_number.clone()
        }
    );

    let order = h
        .services
        .orders
        .get_order_by_number(&order_number)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.fulfillment_status, FulfillmentStatus::Confirmed);

    h.wait_for_notifications(NotificationKind::OrderConfirmation, 1)
        .await;

    // Same event again: no transition, no second notification.
    let replay = h
        .services
        .orders
        .confirm_payment(&payment_ref)
        .await
        .unwrap();
    assert_eq!(replay, ReconciliationOutcome::AlreadyProcessed);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.notifier.count(NotificationKind::OrderConfirmation), 1);

    // The version moved exactly once past intake.
    let stored = Order::find().one(&*h.db).await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn unknown_payment_ref_is_reported_not_errored() {
    let h = TestHarness::new().await;
    let outcome = h
        .services
        .orders
        .confirm_payment("pay_nothing_here")
        .await
        .unwrap();
    assert_eq!(outcome, ReconciliationOutcome::UnknownPaymentRef);
}

#[tokio::test]
async fn late_webhook_cannot_confirm_a_cancelled_order() {
    let h = TestHarness::new().await;
    let (order_number, payment_ref) = place_order(&h).await;

    h.services
        .orders
        .update_order_status(&order_number, FulfillmentStatus::Cancelled)
        .await
        .unwrap();

    let outcome = h
        .services
        .orders
        .confirm_payment(&payment_ref)
        .await
        .unwrap();
    assert_eq!(outcome, ReconciliationOutcome::AlreadyProcessed);

    let order = h
        .services
        .orders
        .get_order_by_number(&order_number)
        .await
        .unwrap();
    assert_eq!(order.fulfillment_status, FulfillmentStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);
}

fn sign(secret: &str, timestamp: i64, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{body}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[tokio::test]
async fn http_webhook_rejects_bad_signatures_and_always_acks_good_ones() {
    let h = TestHarness::new().await;
    let state = h.app_state(Some("wh_secret".to_string()));
    let app = grocerly_api::api_v1_routes().with_state(state);

    let body = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "payment_ref": "pay_unknown" }
    })
    .to_string();
    let ts = chrono::Utc::now().timestamp();

    // Wrong signature: client error, no state change.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/orders/webhook/payment")
                .header("content-type", "application/json")
                .header("x-timestamp", ts.to_string())
                .header("x-signature", "deadbeef")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Valid signature over an unknown payment_ref: the gateway still gets a
    // 200 so it does not retry forever on our internal lookups.
    let signature = sign("wh_secret", ts, &body);
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/orders/webhook/payment")
                .header("content-type", "application/json")
                .header("x-timestamp", ts.to_string())
                .header("x-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload, json!({ "received": true }));
}
