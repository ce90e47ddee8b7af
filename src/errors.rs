use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error payload returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional detail (field-level validation errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Delivery slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Invalid delivery zone: {0}")]
    InvalidZone(String),

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Order subtotal {subtotal} is below the zone minimum of {minimum}")]
    BelowMinimumOrder { subtotal: Decimal, minimum: Decimal },

    #[error("Invalid voucher: {0}")]
    InvalidVoucher(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Payment not completed: {0}")]
    PaymentNotCompleted(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error(
        "Refund for item {item_id} on order {order_number} could not be completed; \
         it has been escalated and will be processed manually within 24 hours"
    )]
    RefundEscalated {
        order_number: String,
        item_id: Uuid,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidOperation(_)
            | Self::SlotUnavailable(_)
            | Self::InvalidZone(_)
            | Self::ProductUnavailable(_)
            | Self::BelowMinimumOrder { .. }
            | Self::InvalidVoucher(_)
            | Self::InvalidTransition { .. }
            | Self::PaymentNotCompleted(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyProcessed(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            Self::ExternalServiceError(_) | Self::RefundEscalated { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(err)).into_response()
    }
}
