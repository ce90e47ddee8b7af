use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::orders::{OrderItemResponse, OrderResponse};
use crate::services::substitutions::SubstitutionOutcome;
use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct OfferSubstitutionRequest {
    pub substitution_product_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondToSubstitutionRequest {
    pub status: SubstitutionOutcome,
}

/// Operator offers a replacement for an out-of-stock line item
#[utoipa::path(
    post,
    path = "/api/v1/orders/admin/{order_number}/items/{item_id}/substitute",
    params(
        ("order_number" = String, Path, description = "Human-facing order number"),
        ("item_id" = Uuid, Path, description = "Order item id")
    ),
    request_body = OfferSubstitutionRequest,
    responses(
        (status = 200, description = "Substitution offered", body = ApiResponse<OrderItemResponse>),
        (status = 404, description = "Order or item not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Substitution already settled", body = crate::errors::ErrorResponse)
    ),
    tag = "Substitutions"
)]
pub async fn offer_substitution(
    State(state): State<AppState>,
    Path((order_number, item_id)): Path<(String, Uuid)>,
    Json(request): Json<OfferSubstitutionRequest>,
) -> Result<Json<ApiResponse<OrderItemResponse>>, ServiceError> {
    let item = state
        .services
        .substitutions
        .offer_substitution(&order_number, item_id, request.substitution_product_id)
        .await?;
    Ok(Json(ApiResponse::success(item)))
}

/// Customer accepts the substitute or asks for a refund
#[utoipa::path(
    post,
    path = "/api/v1/orders/substitution/{order_number}/{item_id}/respond",
    params(
        ("order_number" = String, Path, description = "Human-facing order number"),
        ("item_id" = Uuid, Path, description = "Order item id")
    ),
    request_body = RespondToSubstitutionRequest,
    responses(
        (status = 200, description = "Substitution resolved", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Payment not completed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Already processed", body = crate::errors::ErrorResponse),
        (status = 502, description = "Refund escalated to manual processing", body = crate::errors::ErrorResponse)
    ),
    tag = "Substitutions"
)]
pub async fn respond_to_substitution(
    State(state): State<AppState>,
    Path((order_number, item_id)): Path<(String, Uuid)>,
    Json(request): Json<RespondToSubstitutionRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .substitutions
        .respond_to_substitution(&order_number, item_id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
