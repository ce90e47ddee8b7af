use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A placed grocery order together with its frozen monetary breakdown.
///
/// Owned either by a registered user (`user_id`) or a guest (`guest_email`),
/// never both. Monetary fields are frozen at intake and only rewritten by an
/// accepted substitution.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-facing unique identifier, independent of the internal id.
    pub order_number: String,

    #[sea_orm(nullable)]
    pub user_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub guest_email: Option<String>,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discounted_subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub delivery_fee: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    pub currency: String,

    pub delivery_name: String,
    pub delivery_phone: String,
    pub address_line1: String,
    #[sea_orm(nullable)]
    pub address_line2: Option<String>,
    pub city: String,
    pub postcode: String,

    pub zone_id: Uuid,
    pub slot_id: Uuid,

    /// Opaque authorization handle issued by the payment gateway.
    #[sea_orm(nullable)]
    pub payment_ref: Option<String>,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,

    #[sea_orm(nullable)]
    pub vat_number: Option<String>,
    #[sea_orm(nullable)]
    pub po_number: Option<String>,
    #[sea_orm(nullable)]
    pub voucher_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(
        belongs_to = "super::delivery_slot::Entity",
        from = "Column::SlotId",
        to = "super::delivery_slot::Column::Id"
    )]
    DeliverySlot,
    #[sea_orm(
        belongs_to = "super::delivery_zone::Entity",
        from = "Column::ZoneId",
        to = "super::delivery_zone::Column::Id"
    )]
    DeliveryZone,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::delivery_slot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliverySlot.def()
    }
}

impl Related<super::delivery_zone::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryZone.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Payment reconciliation state, flipped exactly once by the webhook handler.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "paid")]
    Paid,
}

/// Fulfillment lifecycle of an order.
///
/// PENDING -> CONFIRMED is reserved to payment reconciliation; the remaining
/// forward transitions are operator-driven. CANCELLED is reachable from any
/// non-terminal state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "packed")]
    Packed,
    #[sea_orm(string_value = "out_for_delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl FulfillmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// The enforced transition table. Skipping states is rejected.
    pub fn can_transition_to(self, next: Self) -> bool {
        use FulfillmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Packed)
                | (Confirmed, Cancelled)
                | (Packed, OutForDelivery)
                | (Packed, Cancelled)
                | (OutForDelivery, Delivered)
                | (OutForDelivery, Cancelled)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::FulfillmentStatus::*;

    #[test]
    fn forward_transitions_follow_the_table() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Packed));
        assert!(Packed.can_transition_to(OutForDelivery));
        assert!(OutForDelivery.can_transition_to(Delivered));
    }

    #[test]
    fn cancellation_is_reachable_from_every_non_terminal_state() {
        for state in [Pending, Confirmed, Packed, OutForDelivery] {
            assert!(state.can_transition_to(Cancelled), "{state} -> CANCELLED");
        }
    }

    #[test]
    fn illegal_jumps_are_rejected() {
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Packed));
        assert!(!Confirmed.can_transition_to(Delivered));
        assert!(!Packed.can_transition_to(Delivered));
        assert!(!Confirmed.can_transition_to(Pending));
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for state in [Pending, Confirmed, Packed, OutForDelivery, Delivered, Cancelled] {
            assert!(!Delivered.can_transition_to(state));
            assert!(!Cancelled.can_transition_to(state));
        }
        assert!(Delivered.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Packed.is_terminal());
    }
}
