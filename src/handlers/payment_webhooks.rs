use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{error, info, warn};

use crate::{errors::ServiceError, AppState};

type HmacSha256 = Hmac<Sha256>;

/// Payment gateway notification payload. Delivery is at-least-once; the
/// handler stays idempotent through the reconciliation precondition.
#[derive(Debug, Deserialize)]
struct PaymentWebhookEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: PaymentWebhookData,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentWebhookData {
    #[serde(default)]
    payment_ref: Option<String>,
}

/// Gateway callback for asynchronous payment outcomes
#[utoipa::path(
    post,
    path = "/api/v1/orders/webhook/payment",
    request_body = String,
    responses(
        (status = 200, description = "Notification acknowledged"),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    // Verify before trusting a byte of the payload.
    if let Some(secret) = &state.config.payment_webhook_secret {
        if !verify_signature(
            &headers,
            &body,
            secret,
            state.config.payment_webhook_tolerance_secs,
        ) {
            warn!("payment webhook signature verification failed");
            return Err(ServiceError::ValidationError(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let event: PaymentWebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {e}")))?;

    match event.event_type.as_str() {
        "payment_intent.succeeded" | "payment.succeeded" | "charge.succeeded" => {
            match event.data.payment_ref {
                Some(payment_ref) => {
                    // The gateway must not be driven into endless retries by a
                    // recoverable internal problem: log and acknowledge.
                    if let Err(e) = state.services.orders.confirm_payment(&payment_ref).await {
                        error!(
                            event_id = ?event.id,
                            payment_ref = %payment_ref,
                            error = %e,
                            "payment reconciliation failed"
                        );
                    }
                }
                None => {
                    warn!(event_id = ?event.id, "payment-succeeded event without payment_ref");
                }
            }
        }
        other => {
            info!(event_type = %other, "unhandled payment webhook type");
        }
    }

    Ok(Json(json!({ "received": true })))
}

/// HMAC-SHA256 over `"{timestamp}.{body}"` using the shared secret, carried
/// in `x-timestamp` / `x-signature` headers, with a replay tolerance window.
fn verify_signature(headers: &HeaderMap, payload: &Bytes, secret: &str, tolerance_secs: u64) -> bool {
    let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) else {
        return false;
    };
    let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) else {
        return false;
    };

    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    let signed = format!("{}.{}", ts, std::str::from_utf8(payload).unwrap_or(""));
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
