use crate::{
    entities::voucher::{self, Entity as Voucher, Model as VoucherModel, VoucherType},
    entities::voucher_usage::{self, Entity as VoucherUsage},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Rounds a monetary amount to 2 decimal places, half-up on the cent boundary.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// The identity an order belongs to: a registered user or a guest email,
/// never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerIdentity {
    User(Uuid),
    Guest(String),
}

impl OwnerIdentity {
    /// Resolves the exclusive-or pair from a request, rejecting none/both.
    pub fn from_parts(
        user_id: Option<Uuid>,
        guest_email: Option<&str>,
    ) -> Result<Self, ServiceError> {
        match (user_id, guest_email) {
            (Some(id), None) => Ok(Self::User(id)),
            (None, Some(email)) => Ok(Self::Guest(email.trim().to_lowercase())),
            (Some(_), Some(_)) => Err(ServiceError::ValidationError(
                "provide either a user id or a guest email, not both".to_string(),
            )),
            (None, None) => Err(ServiceError::ValidationError(
                "an order must belong to a user id or a guest email".to_string(),
            )),
        }
    }

    /// Stable key used for the voucher single-use uniqueness constraint.
    pub fn usage_key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Guest(email) => format!("guest:{email}"),
        }
    }

    pub fn guest_email(&self) -> Option<&str> {
        match self {
            Self::Guest(email) => Some(email),
            Self::User(_) => None,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User(id) => Some(*id),
            Self::Guest(_) => None,
        }
    }
}

/// Why a voucher code was refused. Each check has its own reason so the
/// caller can surface a precise message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoucherRejection {
    #[error("voucher code not recognised")]
    UnknownCode,
    #[error("voucher is no longer active")]
    Inactive,
    #[error("voucher is not valid yet")]
    NotStarted,
    #[error("voucher has expired")]
    Expired,
    #[error("voucher usage limit has been reached")]
    UsageCapReached,
    #[error("order subtotal is below the voucher minimum of {minimum}")]
    BelowMinimum { minimum: Decimal },
    #[error("voucher already used")]
    AlreadyUsed,
}

/// A validated voucher together with the discount it yields for a subtotal.
#[derive(Debug, Clone)]
pub struct VoucherQuote {
    pub voucher: VoucherModel,
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone)]
pub enum VoucherDecision {
    Valid(VoucherQuote),
    Invalid(VoucherRejection),
}

/// The frozen monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub discounted_subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
}

/// Computes order totals and validates voucher codes. Performs no mutation;
/// usage recording belongs to the intake transaction.
#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
}

impl PricingService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validates a voucher code for an owner and subtotal. Checks run in a
    /// fixed order and the first failure wins.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn validate(
        &self,
        code: &str,
        owner: &OwnerIdentity,
        subtotal: Decimal,
    ) -> Result<VoucherDecision, ServiceError> {
        let canonical = code.trim().to_uppercase();

        let Some(v) = Voucher::find()
            .filter(voucher::Column::Code.eq(canonical.clone()))
            .one(&*self.db)
            .await?
        else {
            return Ok(VoucherDecision::Invalid(VoucherRejection::UnknownCode));
        };

        if let Some(rejection) = Self::check_window_and_caps(&v, subtotal) {
            return Ok(VoucherDecision::Invalid(rejection));
        }

        if v.one_time_per_user {
            let prior = VoucherUsage::find()
                .filter(voucher_usage::Column::VoucherId.eq(v.id))
                .filter(match owner {
                    OwnerIdentity::User(id) => voucher_usage::Column::UserId.eq(*id),
                    OwnerIdentity::Guest(email) => {
                        voucher_usage::Column::GuestEmail.eq(email.clone())
                    }
                })
                .count(&*self.db)
                .await?;
            if prior > 0 {
                debug!(code = %canonical, "voucher already redeemed by owner");
                return Ok(VoucherDecision::Invalid(VoucherRejection::AlreadyUsed));
            }
        }

        let discount_amount = Self::compute_discount(&v, subtotal);
        Ok(VoucherDecision::Valid(VoucherQuote {
            voucher: v,
            discount_amount,
        }))
    }

    fn check_window_and_caps(v: &VoucherModel, subtotal: Decimal) -> Option<VoucherRejection> {
        let now = Utc::now();
        if !v.is_active {
            return Some(VoucherRejection::Inactive);
        }
        if now < v.valid_from {
            return Some(VoucherRejection::NotStarted);
        }
        if now > v.valid_until {
            return Some(VoucherRejection::Expired);
        }
        if let Some(cap) = v.max_uses {
            if v.current_uses >= cap {
                return Some(VoucherRejection::UsageCapReached);
            }
        }
        if subtotal < v.min_order {
            return Some(VoucherRejection::BelowMinimum {
                minimum: v.min_order,
            });
        }
        None
    }

    /// FIXED vouchers never discount past the subtotal; PERCENTAGE values are
    /// capped at 100 at voucher creation so no extra clamp is needed.
    pub fn compute_discount(v: &VoucherModel, subtotal: Decimal) -> Decimal {
        let raw = match v.voucher_type {
            VoucherType::Fixed => v.value.min(subtotal),
            VoucherType::Percentage => subtotal * v.value / Decimal::from(100),
        };
        round_money(raw)
    }

    /// Assembles the frozen monetary breakdown, rounding at each boundary.
    pub fn finalize_totals(
        subtotal: Decimal,
        discount_amount: Decimal,
        delivery_fee: Decimal,
    ) -> OrderTotals {
        let subtotal = round_money(subtotal);
        let discount_amount = round_money(discount_amount);
        let discounted_subtotal = round_money((subtotal - discount_amount).max(Decimal::ZERO));
        let delivery_fee = round_money(delivery_fee);
        let total = round_money(discounted_subtotal + delivery_fee);
        OrderTotals {
            subtotal,
            discount_amount,
            discounted_subtotal,
            delivery_fee,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn voucher(voucher_type: VoucherType, value: Decimal, min_order: Decimal) -> VoucherModel {
        VoucherModel {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            voucher_type,
            value,
            min_order,
            valid_from: Utc::now() - Duration::days(1),
            valid_until: Utc::now() + Duration::days(30),
            max_uses: None,
            current_uses: 0,
            one_time_per_user: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        let v = voucher(VoucherType::Fixed, dec!(10), dec!(0));
        assert_eq!(PricingService::compute_discount(&v, dec!(40)), dec!(10));
        assert_eq!(PricingService::compute_discount(&v, dec!(6.50)), dec!(6.50));
    }

    #[test]
    fn percentage_discount_rounds_half_up_at_the_cent() {
        let v = voucher(VoucherType::Percentage, dec!(15), dec!(0));
        // 33.33 * 15% = 4.9995 -> 5.00
        assert_eq!(
            PricingService::compute_discount(&v, dec!(33.33)),
            dec!(5.00)
        );
        // 10.10 * 15% = 1.515 -> 1.52
        assert_eq!(
            PricingService::compute_discount(&v, dec!(10.10)),
            dec!(1.52)
        );
    }

    #[test]
    fn totals_identity_holds() {
        let t = PricingService::finalize_totals(dec!(40), dec!(10), dec!(5.99));
        assert_eq!(t.discounted_subtotal, dec!(30));
        assert_eq!(t.total, dec!(35.99));
        assert_eq!(t.total, round_money(t.discounted_subtotal + t.delivery_fee));
    }

    #[test]
    fn discount_larger_than_subtotal_floors_at_zero() {
        let t = PricingService::finalize_totals(dec!(8), dec!(10), dec!(3.50));
        assert_eq!(t.discounted_subtotal, dec!(0));
        assert_eq!(t.total, dec!(3.50));
    }

    #[test]
    fn window_and_cap_checks_fire_in_order() {
        let mut v = voucher(VoucherType::Fixed, dec!(5), dec!(30));
        v.is_active = false;
        assert_eq!(
            PricingService::check_window_and_caps(&v, dec!(50)),
            Some(VoucherRejection::Inactive)
        );

        let mut v = voucher(VoucherType::Fixed, dec!(5), dec!(30));
        v.valid_from = Utc::now() + Duration::days(1);
        assert_eq!(
            PricingService::check_window_and_caps(&v, dec!(50)),
            Some(VoucherRejection::NotStarted)
        );

        let mut v = voucher(VoucherType::Fixed, dec!(5), dec!(30));
        v.valid_until = Utc::now() - Duration::hours(1);
        assert_eq!(
            PricingService::check_window_and_caps(&v, dec!(50)),
            Some(VoucherRejection::Expired)
        );

        let mut v = voucher(VoucherType::Fixed, dec!(5), dec!(30));
        v.max_uses = Some(3);
        v.current_uses = 3;
        assert_eq!(
            PricingService::check_window_and_caps(&v, dec!(50)),
            Some(VoucherRejection::UsageCapReached)
        );

        let v = voucher(VoucherType::Fixed, dec!(5), dec!(30));
        assert_eq!(
            PricingService::check_window_and_caps(&v, dec!(20)),
            Some(VoucherRejection::BelowMinimum { minimum: dec!(30) })
        );
        assert_eq!(PricingService::check_window_and_caps(&v, dec!(30)), None);
    }

    #[test]
    fn owner_identity_is_exclusive_or() {
        let user = Uuid::new_v4();
        assert!(OwnerIdentity::from_parts(Some(user), None).is_ok());
        assert!(OwnerIdentity::from_parts(None, Some("a@b.com")).is_ok());
        assert!(OwnerIdentity::from_parts(None, None).is_err());
        assert!(OwnerIdentity::from_parts(Some(user), Some("a@b.com")).is_err());
    }

    #[test]
    fn guest_emails_are_normalised_in_usage_keys() {
        let owner = OwnerIdentity::from_parts(None, Some("  Fresh@Example.COM ")).unwrap();
        assert_eq!(owner.usage_key(), "guest:fresh@example.com");
    }
}
