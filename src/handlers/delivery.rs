use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::entities::{delivery_slot, delivery_zone};
use crate::services::slots::{GenerateSlotsOutcome, GenerateSlotsRequest};
use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub struct SlotListQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ZoneLookupQuery {
    pub postcode: String,
}

/// Open delivery slots, soonest first
#[utoipa::path(
    get,
    path = "/api/v1/delivery/slots",
    params(("date" = Option<String>, Query, description = "Restrict to a single date (YYYY-MM-DD)")),
    responses((status = 200, description = "Available slots")),
    tag = "Delivery"
)]
pub async fn list_slots(
    State(state): State<AppState>,
    Query(query): Query<SlotListQuery>,
) -> Result<Json<ApiResponse<Vec<delivery_slot::Model>>>, ServiceError> {
    let slots = state.services.slots.list_available(query.date).await?;
    Ok(Json(ApiResponse::success(slots)))
}

/// Bulk slot generation over a date range
#[utoipa::path(
    post,
    path = "/api/v1/delivery/admin/slots/generate",
    responses(
        (status = 200, description = "Slots generated", body = ApiResponse<GenerateSlotsOutcome>),
        (status = 400, description = "Invalid range or windows", body = crate::errors::ErrorResponse)
    ),
    tag = "Delivery"
)]
pub async fn generate_slots(
    State(state): State<AppState>,
    Json(request): Json<GenerateSlotsRequest>,
) -> Result<Json<ApiResponse<GenerateSlotsOutcome>>, ServiceError> {
    let outcome = state.services.slots.generate_slots(request).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Resolve the delivery zone serving a postcode
#[utoipa::path(
    get,
    path = "/api/v1/delivery/zones/lookup",
    params(("postcode" = String, Query, description = "Delivery postcode")),
    responses(
        (status = 200, description = "Matching zone"),
        (status = 404, description = "No zone serves this postcode", body = crate::errors::ErrorResponse)
    ),
    tag = "Delivery"
)]
pub async fn lookup_zone(
    State(state): State<AppState>,
    Query(query): Query<ZoneLookupQuery>,
) -> Result<Json<ApiResponse<delivery_zone::Model>>, ServiceError> {
    let zone = state
        .services
        .zones
        .find_for_postcode(&query.postcode)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("No delivery zone serves {}", query.postcode))
        })?;
    Ok(Json(ApiResponse::success(zone)))
}
