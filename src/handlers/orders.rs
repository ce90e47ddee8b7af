use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::services::orders::{
    CreateOrderRequest, OrderListResponse, OrderResponse, PlacedOrder, UpdateOrderStatusRequest,
};
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery};

/// Create an order from a cart payload
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created and payment authorized", body = ApiResponse<PlacedOrder>),
        (status = 400, description = "Validation or business-rule failure", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment declined", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unreachable", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PlacedOrder>>), ServiceError> {
    let placed = state.services.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(placed))))
}

/// Public read of a single order by its number
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_number}",
    params(("order_number" = String, Path, description = "Human-facing order number")),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_by_number(&order_number)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Admin listing of orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<OrderListResponse>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let orders = state
        .services
        .orders
        .list_orders(query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Operator-driven fulfillment status transition
#[utoipa::path(
    patch,
    path = "/api/v1/orders/admin/{order_number}/status",
    params(("order_number" = String, Path, description = "Human-facing order number")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Illegal transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .update_order_status(&order_number, request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
