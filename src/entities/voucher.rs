use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A discount code. `current_uses` is only incremented in the same
/// transaction that records a `voucher_usage` row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Canonicalized to uppercase at creation; lookups uppercase their input.
    pub code: String,
    pub voucher_type: VoucherType,
    /// Fixed amount for FIXED, percent (<= 100) for PERCENTAGE.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub min_order: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// None = unlimited.
    #[sea_orm(nullable)]
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub one_time_per_user: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::voucher_usage::Entity")]
    Usages,
}

impl Related<super::voucher_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Usages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

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
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherType {
    #[sea_orm(string_value = "fixed")]
    Fixed,
    #[sea_orm(string_value = "percentage")]
    Percentage,
}
