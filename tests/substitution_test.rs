//! Substitution workflow: offer/re-offer rules, accept repricing, and the
//! refund path whose gateway failure must escalate instead of lying.

mod common;

use assert_matches::assert_matches;
use common::{order_request, TestHarness};
use grocerly_api::entities::order_item::SubstitutionStatus;
use grocerly_api::errors::ServiceError;
use grocerly_api::services::notifications::NotificationKind;
use grocerly_api::services::orders::PlacedOrder;
use grocerly_api::services::substitutions::SubstitutionOutcome;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use uuid::Uuid;

struct SubFixture {
    h: TestHarness,
    placed: PlacedOrder,
    item_id: Uuid,
    substitute_id: Uuid,
}

/// Order with one £8 x 2 line (=£16) plus a £20 filler line so the basket
/// clears any minimum; substitute priced £9.
async fn fixture() -> SubFixture {
    let h = TestHarness::new().await;
    let zone = h.seed_zone("N1", dec!(2.99), dec!(0)).await;
    let slot = h.seed_slot(10).await;
    let salmon = h.seed_product("Salmon Fillets", dec!(8)).await;
    let filler = h.seed_product("Pantry Box", dec!(20)).await;
    let trout = h.seed_product("Trout Fillets", dec!(9)).await;

    let placed = h
        .services
        .orders
        .create_order(order_request(
            "subs@example.com",
            "N1 1AA",
            zone.id,
            slot.id,
            vec![(salmon.id, 2), (filler.id, 1)],
            None,
        ))
        .await
        .unwrap();
    let item_id = placed
        .order
        .items
        .iter()
        .find(|i| i.product_id == salmon.id)
        .unwrap()
        .id;

    SubFixture {
        h,
        placed,
        item_id,
        substitute_id: trout.id,
    }
}

#[tokio::test]
async fn offering_marks_the_item_pending_and_notifies_the_customer() {
    let f = fixture().await;
    let item = f
        .h
        .services
        .substitutions
        .offer_substitution(&f.placed.order.order_number, f.item_id, f.substitute_id)
        .await
        .unwrap();

    assert_eq!(item.substitution_status, SubstitutionStatus::Pending);
    assert_eq!(item.substitution_product_id, Some(f.substitute_id));
    f.h.wait_for_notifications(NotificationKind::SubstitutionOffer, 1)
        .await;

    // Re-offering before any response is an allowed no-op refresh.
    f.h.services
        .substitutions
        .offer_substitution(&f.placed.order.order_number, f.item_id, f.substitute_id)
        .await
        .expect("re-offer while pending is allowed");
}

#[tokio::test]
async fn offering_an_unavailable_substitute_is_rejected() {
    let f = fixture().await;
    let ghost = Uuid::new_v4();
    let err = f
        .h
        .services
        .substitutions
        .offer_substitution(&f.placed.order.order_number, f.item_id, ghost)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProductUnavailable(_));
}

#[tokio::test]
async fn accepting_swaps_the_snapshot_and_moves_the_total_by_the_line_delta() {
    let f = fixture().await;
    let old_total = f.placed.order.total;

    f.h.services
        .substitutions
        .offer_substitution(&f.placed.order.order_number, f.item_id, f.substitute_id)
        .await
        .unwrap();

    let updated = f
        .h
        .services
        .substitutions
        .respond_to_substitution(
            &f.placed.order.order_number,
            f.item_id,
            SubstitutionOutcome::Accepted,
        )
        .await
        .unwrap();

    let item = updated.items.iter().find(|i| i.id == f.item_id).unwrap();
    assert_eq!(item.substitution_status, SubstitutionStatus::Accepted);
    assert_eq!(item.name, "Trout Fillets");
    assert_eq!(item.unit_price, dec!(9));
    assert_eq!(item.total_price, dec!(18));

    // 8x2 = 16 replaced by 9x2 = 18: the order grows by exactly 2.
    assert_eq!(updated.total, old_total + dec!(2));
    assert_eq!(updated.subtotal, dec!(38));
    assert_eq!(
        updated.total,
        updated.discounted_subtotal + updated.delivery_fee
    );

    // A settled item cannot be re-offered or re-answered.
    let err = f
        .h
        .services
        .substitutions
        .offer_substitution(&f.placed.order.order_number, f.item_id, f.substitute_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyProcessed(_));
    let err = f
        .h
        .services
        .substitutions
        .respond_to_substitution(
            &f.placed.order.order_number,
            f.item_id,
            SubstitutionOutcome::Refunded,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyProcessed(_));
}

#[tokio::test]
async fn responding_without_a_pending_offer_is_rejected() {
    let f = fixture().await;
    let err = f
        .h
        .services
        .substitutions
        .respond_to_substitution(
            &f.placed.order.order_number,
            f.item_id,
            SubstitutionOutcome::Accepted,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyProcessed(_));
}

#[tokio::test]
async fn refund_requires_a_completed_payment() {
    let f = fixture().await;
    f.h.services
        .substitutions
        .offer_substitution(&f.placed.order.order_number, f.item_id, f.substitute_id)
        .await
        .unwrap();

    let err = f
        .h
        .services
        .substitutions
        .respond_to_substitution(
            &f.placed.order.order_number,
            f.item_id,
            SubstitutionOutcome::Refunded,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PaymentNotCompleted(_));
    assert_eq!(f.h.gateway.refund_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refund_issues_exactly_the_line_total_once_paid() {
    let f = fixture().await;
    f.h.services
        .orders
        .confirm_payment(&f.placed.payment_ref)
        .await
        .unwrap();
    f.h.services
        .substitutions
        .offer_substitution(&f.placed.order.order_number, f.item_id, f.substitute_id)
        .await
        .unwrap();

    let updated = f
        .h
        .services
        .substitutions
        .respond_to_substitution(
            &f.placed.order.order_number,
            f.item_id,
            SubstitutionOutcome::Refunded,
        )
        .await
        .unwrap();

    let item = updated.items.iter().find(|i| i.id == f.item_id).unwrap();
    assert_eq!(item.substitution_status, SubstitutionStatus::Refunded);

    let refunds = f.h.gateway.refunds.lock().unwrap().clone();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].0, f.placed.payment_ref);
    assert_eq!(refunds[0].1, dec!(16));

    f.h.wait_for_notifications(NotificationKind::RefundConfirmation, 1)
        .await;
}

#[tokio::test]
async fn failed_refund_keeps_the_item_actionable_and_escalates() {
    let f = fixture().await;
    f.h.services
        .orders
        .confirm_payment(&f.placed.payment_ref)
        .await
        .unwrap();
    f.h.services
        .substitutions
        .offer_substitution(&f.placed.order.order_number, f.item_id, f.substitute_id)
        .await
        .unwrap();

    f.h.gateway.set_fail_refund(true);
    let err = f
        .h
        .services
        .substitutions
        .respond_to_substitution(
            &f.placed.order.order_number,
            f.item_id,
            SubstitutionOutcome::Refunded,
        )
        .await
        .expect_err("gateway failure must surface");

    // Distinct escalation error, not a generic failure.
    assert_matches!(
        err,
        ServiceError::RefundEscalated { ref order_number, item_id }
            if *order_number == f.placed.order.order_number && item_id == f.item_id
    );

    // Item is back to PENDING, still actionable.
    let order = f
        .h
        .services
        .orders
        .get_order_by_number(&f.placed.order.order_number)
        .await
        .unwrap();
    let item = order.items.iter().find(|i| i.id == f.item_id).unwrap();
    assert_eq!(item.substitution_status, SubstitutionStatus::Pending);

    // Operator got the full escalation context.
    assert_eq!(f.h.notifier.count(NotificationKind::OperatorAlert), 1);
    let alert = f
        .h
        .notifier
        .last_of(NotificationKind::OperatorAlert)
        .unwrap();
    assert!(alert.high_priority);
    assert_eq!(alert.recipient, "ops@grocerly.test");
    assert_eq!(
        alert.payload["order_number"],
        f.placed.order.order_number.as_str()
    );

    // No refund confirmation was sent for money that never moved.
    assert_eq!(f.h.notifier.count(NotificationKind::RefundConfirmation), 0);

    // Once the gateway recovers, the same item can be refunded.
    f.h.gateway.set_fail_refund(false);
    f.h.services
        .substitutions
        .respond_to_substitution(
            &f.placed.order.order_number,
            f.item_id,
            SubstitutionOutcome::Refunded,
        )
        .await
        .expect("retry after recovery succeeds");
}
