//! Operator status transitions: the transition table is enforced, payment
//! confirmation is reserved to the webhook, and milestone notifications fire.

mod common;

use assert_matches::assert_matches;
use common::{order_request, TestHarness};
use grocerly_api::entities::order::FulfillmentStatus;
use grocerly_api::errors::ServiceError;
use grocerly_api::services::notifications::NotificationKind;
use rust_decimal_macros::dec;

async fn confirmed_order(h: &TestHarness) -> String {
    let zone = h.seed_zone("N1", dec!(2.99), dec!(0)).await;
    let slot = h.seed_slot(10).await;
    let basket = h.seed_product("Veg Box", dec!(25)).await;
    let placed = h
        .services
        .orders
        .create_order(order_request(
            "status@example.com",
            "N1 1AA",
            zone.id,
            slot.id,
            vec![(basket.id, 1)],
            None,
        ))
        .await
        .unwrap();
    h.services
        .orders
        .confirm_payment(&placed.payment_ref)
        .await
        .unwrap();
    placed.order.order_number
}

#[tokio::test]
async fn the_happy_path_walks_the_full_table() {
    let h = TestHarness::new().await;
    let order_number = confirmed_order(&h).await;

    for status in [
        FulfillmentStatus::Packed,
        FulfillmentStatus::OutForDelivery,
        FulfillmentStatus::Delivered,
    ] {
        let updated = h
            .services
            .orders
            .update_order_status(&order_number, status)
            .await
            .unwrap();
        assert_eq!(updated.fulfillment_status, status);
    }

    // Milestone notifications: packed, and out-for-delivery with a window.
    h.wait_for_notifications(NotificationKind::StatusUpdate, 2)
        .await;
    let messages = h.notifier.messages.lock().unwrap().clone();
    let statuses: Vec<String> = messages
        .iter()
        .filter(|m| m.kind == NotificationKind::StatusUpdate)
        .map(|m| m.payload["status"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(statuses.contains(&"PACKED".to_string()));
    assert!(statuses.contains(&"OUT_FOR_DELIVERY".to_string()));
    let out = messages
        .iter()
        .find(|m| m.payload["status"] == "OUT_FOR_DELIVERY")
        .unwrap();
    assert!(out.payload["delivery_window"].is_string());
}

#[tokio::test]
async fn illegal_jumps_are_rejected_with_a_dedicated_error() {
    let h = TestHarness::new().await;
    let order_number = confirmed_order(&h).await;

    let err = h
        .services
        .orders
        .update_order_status(&order_number, FulfillmentStatus::Delivered)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });

    // Terminal states admit nothing further.
    h.services
        .orders
        .update_order_status(&order_number, FulfillmentStatus::Cancelled)
        .await
        .unwrap();
    let err = h
        .services
        .orders
        .update_order_status(&order_number, FulfillmentStatus::Packed)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
}

#[tokio::test]
async fn operators_cannot_flip_orders_to_confirmed() {
    let h = TestHarness::new().await;
    let zone = h.seed_zone("N1", dec!(2.99), dec!(0)).await;
    let slot = h.seed_slot(10).await;
    let basket = h.seed_product("Veg Box", dec!(25)).await;
    let placed = h
        .services
        .orders
        .create_order(order_request(
            "status@example.com",
            "N1 1AA",
            zone.id,
            slot.id,
            vec![(basket.id, 1)],
            None,
        ))
        .await
        .unwrap();

    let err = h
        .services
        .orders
        .update_order_status(&placed.order.order_number, FulfillmentStatus::Confirmed)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn unknown_orders_are_not_found() {
    let h = TestHarness::new().await;
    let err = h
        .services
        .orders
        .update_order_status("GR-00000000000000-0000", FulfillmentStatus::Packed)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
