use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shipping region matched by postcode prefix, carrying its flat delivery
/// fee and minimum order amount.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_zones")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Comma-separated postcode prefixes, stored uppercase (e.g. "N1,N7,EC1").
    pub postcode_prefixes: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub delivery_fee: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub min_order: Decimal,
    pub is_active: bool,
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
    /// Case-insensitive prefix membership test against the zone's prefix list.
    pub fn matches_postcode(&self, postcode: &str) -> bool {
        let normalized = postcode.trim().replace(' ', "").to_uppercase();
        self.postcode_prefixes
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .any(|prefix| normalized.starts_with(&prefix.to_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn zone(prefixes: &str) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "North London".into(),
            postcode_prefixes: prefixes.into(),
            delivery_fee: dec!(5.99),
            min_order: dec!(30),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn matches_by_prefix_ignoring_case_and_spaces() {
        let z = zone("N1,N7,EC1");
        assert!(z.matches_postcode("N1 9GU"));
        assert!(z.matches_postcode("n7 8aa"));
        assert!(z.matches_postcode("EC1V 2NX"));
        assert!(!z.matches_postcode("SW1A 1AA"));
    }

    #[test]
    fn empty_prefix_segments_never_match() {
        let z = zone("N1,,  ,");
        assert!(z.matches_postcode("N1 9GU"));
        assert!(!z.matches_postcode("SE1 7PB"));
    }
}
