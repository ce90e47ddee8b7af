use crate::{
    entities::delivery_slot::{self, Entity as DeliverySlot, Model as SlotModel},
    errors::ServiceError,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

const MAX_GENERATION_RANGE_DAYS: i64 = 92;

/// Tracks delivery-slot booking counts against each slot's capacity.
///
/// The capacity claim is a single conditional UPDATE executed on the order
/// persistence transaction; a separate read-then-write would let two
/// concurrent orders both slip past a nearly-full slot.
#[derive(Clone)]
pub struct SlotService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SlotWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct GenerateSlotsRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub windows: Vec<SlotWindow>,
    pub max_orders: i32,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct GenerateSlotsOutcome {
    pub created: u32,
    pub skipped: u32,
}

impl SlotService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, slot_id: Uuid) -> Result<Option<SlotModel>, ServiceError> {
        Ok(DeliverySlot::find_by_id(slot_id).one(&*self.db).await?)
    }

    /// Loads a slot and rejects up front when it cannot take another order.
    /// The definitive check is `claim_booking`; this one exists so intake can
    /// fail fast before touching the payment gateway.
    pub async fn get_bookable(&self, slot_id: Uuid) -> Result<SlotModel, ServiceError> {
        let slot = self
            .get(slot_id)
            .await?
            .ok_or_else(|| ServiceError::SlotUnavailable(format!("slot {slot_id} not found")))?;
        if !slot.has_capacity() {
            return Err(ServiceError::SlotUnavailable(format!(
                "slot {} on {} is fully booked or closed",
                slot_id, slot.slot_date
            )));
        }
        Ok(slot)
    }

    /// Atomically claims one booking on the given connection (normally the
    /// order-creation transaction). Zero rows affected means the slot filled
    /// up or closed since the fast check.
    pub async fn claim_booking<C: ConnectionTrait>(
        &self,
        conn: &C,
        slot_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = DeliverySlot::update_many()
            .col_expr(
                delivery_slot::Column::CurrentBookings,
                Expr::col(delivery_slot::Column::CurrentBookings).add(1),
            )
            .filter(delivery_slot::Column::Id.eq(slot_id))
            .filter(delivery_slot::Column::IsAvailable.eq(true))
            .filter(
                Expr::col(delivery_slot::Column::CurrentBookings)
                    .lt(Expr::col(delivery_slot::Column::MaxOrders)),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::SlotUnavailable(format!(
                "slot {slot_id} has no remaining capacity"
            )));
        }
        Ok(())
    }

    /// Releases one booking, floored at zero. Used when an order is
    /// cancelled so the window becomes sellable again.
    pub async fn release_booking<C: ConnectionTrait>(
        &self,
        conn: &C,
        slot_id: Uuid,
    ) -> Result<(), ServiceError> {
        DeliverySlot::update_many()
            .col_expr(
                delivery_slot::Column::CurrentBookings,
                Expr::col(delivery_slot::Column::CurrentBookings).sub(1),
            )
            .filter(delivery_slot::Column::Id.eq(slot_id))
            .filter(Expr::col(delivery_slot::Column::CurrentBookings).gt(0))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Lists open slots, optionally for a single date, soonest first.
    pub async fn list_available(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<Vec<SlotModel>, ServiceError> {
        let mut query = DeliverySlot::find()
            .filter(delivery_slot::Column::IsAvailable.eq(true))
            .filter(
                Expr::col(delivery_slot::Column::CurrentBookings)
                    .lt(Expr::col(delivery_slot::Column::MaxOrders)),
            );
        if let Some(d) = date {
            query = query.filter(delivery_slot::Column::SlotDate.eq(d));
        }
        Ok(query
            .order_by_asc(delivery_slot::Column::SlotDate)
            .order_by_asc(delivery_slot::Column::StartTime)
            .all(&*self.db)
            .await?)
    }

    /// Bulk-creates one slot per (date, window) over a date range, skipping
    /// combinations that already exist.
    #[instrument(skip(self, request), fields(start = %request.start_date, end = %request.end_date))]
    pub async fn generate_slots(
        &self,
        request: GenerateSlotsRequest,
    ) -> Result<GenerateSlotsOutcome, ServiceError> {
        if request.end_date < request.start_date {
            return Err(ServiceError::ValidationError(
                "end_date must not precede start_date".to_string(),
            ));
        }
        let span = (request.end_date - request.start_date).num_days();
        if span > MAX_GENERATION_RANGE_DAYS {
            return Err(ServiceError::ValidationError(format!(
                "date range exceeds {MAX_GENERATION_RANGE_DAYS} days"
            )));
        }
        if request.windows.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one time window is required".to_string(),
            ));
        }
        if request.max_orders < 1 {
            return Err(ServiceError::ValidationError(
                "max_orders must be positive".to_string(),
            ));
        }
        for w in &request.windows {
            if w.end_time <= w.start_time {
                return Err(ServiceError::ValidationError(format!(
                    "window {}-{} ends before it starts",
                    w.start_time, w.end_time
                )));
            }
        }

        let mut created = 0u32;
        let mut skipped = 0u32;
        let mut date = request.start_date;
        while date <= request.end_date {
            for w in &request.windows {
                let exists = DeliverySlot::find()
                    .filter(delivery_slot::Column::SlotDate.eq(date))
                    .filter(delivery_slot::Column::StartTime.eq(w.start_time))
                    .filter(delivery_slot::Column::EndTime.eq(w.end_time))
                    .count(&*self.db)
                    .await?;
                if exists > 0 {
                    skipped += 1;
                    continue;
                }

                delivery_slot::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    slot_date: Set(date),
                    start_time: Set(w.start_time),
                    end_time: Set(w.end_time),
                    max_orders: Set(request.max_orders),
                    current_bookings: Set(0),
                    is_available: Set(true),
                    created_at: Set(Utc::now()),
                }
                .insert(&*self.db)
                .await?;
                created += 1;
            }
            date = date
                .succ_opt()
                .ok_or_else(|| ServiceError::InternalError("date overflow".to_string()))?;
        }

        info!(created, skipped, "slot generation finished");
        Ok(GenerateSlotsOutcome { created, skipped })
    }
}
