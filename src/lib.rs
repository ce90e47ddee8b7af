//! Grocerly API Library
//!
//! Backend service for online grocery ordering: order intake, delivery-slot
//! capacity, voucher pricing, asynchronous payment reconciliation and the
//! substitution workflow.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::{
    extract::State,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrapper
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::create_order,
        handlers::orders::get_order,
        handlers::orders::list_orders,
        handlers::orders::update_order_status,
        handlers::payment_webhooks::payment_webhook,
        handlers::substitutions::offer_substitution,
        handlers::substitutions::respond_to_substitution,
        handlers::delivery::list_slots,
        handlers::delivery::generate_slots,
        handlers::delivery::lookup_zone,
    ),
    components(schemas(
        errors::ErrorResponse,
        services::orders::CreateOrderRequest,
        services::orders::CreateOrderItemRequest,
        services::orders::DeliveryAddress,
        services::orders::UpdateOrderStatusRequest,
        services::orders::OrderResponse,
        services::orders::OrderItemResponse,
        services::orders::OrderListResponse,
        services::orders::PlacedOrder,
        services::substitutions::SubstitutionOutcome,
        handlers::substitutions::OfferSubstitutionRequest,
        handlers::substitutions::RespondToSubstitutionRequest,
        services::slots::GenerateSlotsOutcome,
        entities::order::PaymentStatus,
        entities::order::FulfillmentStatus,
        entities::order_item::SubstitutionStatus,
    )),
    tags(
        (name = "Orders", description = "Order intake, reads and status transitions"),
        (name = "Payments", description = "Payment gateway reconciliation"),
        (name = "Substitutions", description = "Out-of-stock replacement workflow"),
        (name = "Delivery", description = "Delivery slots and zones")
    )
)]
pub struct ApiDoc;

// API routes mounted under /api/v1
pub fn api_v1_routes() -> Router<AppState> {
    let orders = Router::new()
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route(
            "/orders/webhook/payment",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route(
            "/orders/admin/:order_number/status",
            patch(handlers::orders::update_order_status),
        )
        .route(
            "/orders/admin/:order_number/items/:item_id/substitute",
            post(handlers::substitutions::offer_substitution),
        )
        .route(
            "/orders/substitution/:order_number/:item_id/respond",
            post(handlers::substitutions::respond_to_substitution),
        )
        .route("/orders/:order_number", get(handlers::orders::get_order));

    let delivery = Router::new()
        .route("/delivery/slots", get(handlers::delivery::list_slots))
        .route(
            "/delivery/admin/slots/generate",
            post(handlers::delivery::generate_slots),
        )
        .route(
            "/delivery/zones/lookup",
            get(handlers::delivery::lookup_zone),
        );

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_spec))
        .merge(orders)
        .merge(delivery)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "service": "grocerly-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });
    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Ok(Json(ApiResponse::success(health_data)))
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
