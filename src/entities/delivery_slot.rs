use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded delivery window on a date with limited order capacity.
/// `current_bookings` is only ever moved by the atomic claim/release
/// operations in the slot service.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_slots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_orders: i32,
    pub current_bookings: i32,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn has_capacity(&self) -> bool {
        self.is_available && self.current_bookings < self.max_orders
    }

    /// Human-readable window for notifications, e.g. "2025-03-14 10:00-12:00".
    pub fn window_label(&self) -> String {
        format!(
            "{} {}-{}",
            self.slot_date,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}
