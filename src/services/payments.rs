use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::errors::ServiceError;

/// Failure modes of the payment processor, kept separate from `ServiceError`
/// so callers can distinguish a decline from an outage.
#[derive(Debug, thiserror::Error)]
pub enum PaymentGatewayError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment gateway transport failure: {0}")]
    Transport(String),
    #[error("unexpected payment gateway response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for PaymentGatewayError {
    fn from(err: reqwest::Error) -> Self {
        PaymentGatewayError::Transport(err.to_string())
    }
}

impl From<PaymentGatewayError> for ServiceError {
    fn from(err: PaymentGatewayError) -> Self {
        match err {
            PaymentGatewayError::Declined(msg) => ServiceError::PaymentDeclined(msg),
            PaymentGatewayError::Transport(msg) | PaymentGatewayError::Protocol(msg) => {
                ServiceError::ExternalServiceError(msg)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationRequest {
    /// Tagged onto the authorization so the asynchronous webhook can be
    /// correlated back to the order.
    pub order_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_email: Option<String>,
}

/// Opaque reference to a pending charge held by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentAuthorization {
    pub payment_ref: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub amount: Decimal,
}

/// Boundary to the third-party payment processor. Injected as a capability
/// so the authorization, reconciliation and refund-failure paths are
/// testable against fakes.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<PaymentAuthorization, PaymentGatewayError>;

    async fn refund(
        &self,
        payment_ref: &str,
        amount: Decimal,
    ) -> Result<RefundReceipt, PaymentGatewayError>;

    /// Best-effort release of an authorization whose order never persisted.
    async fn void(&self, payment_ref: &str) -> Result<(), PaymentGatewayError>;
}

#[derive(Deserialize)]
struct GatewayChargeResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
}

#[derive(Deserialize)]
struct GatewayRefundResponse {
    id: String,
    amount: Decimal,
}

/// Production gateway client speaking JSON over HTTPS.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build payment gateway HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn read_failure(response: reqwest::Response) -> PaymentGatewayError {
        let status = response.status();
        let detail = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        if status.is_client_error() {
            PaymentGatewayError::Declined(format!("{status}: {detail}"))
        } else {
            PaymentGatewayError::Protocol(format!("{status}: {detail}"))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(order_number = %request.order_number, amount = %request.amount))]
    async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<PaymentAuthorization, PaymentGatewayError> {
        let response = self
            .request("/v1/authorizations")
            .json(&serde_json::json!({
                "amount": request.amount,
                "currency": request.currency,
                "customer_email": request.customer_email,
                "metadata": { "order_number": request.order_number },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::read_failure(response).await;
            warn!(error = %err, "payment authorization failed");
            return Err(err);
        }

        let charge: GatewayChargeResponse = response
            .json()
            .await
            .map_err(|e| PaymentGatewayError::Protocol(e.to_string()))?;
        info!(payment_ref = %charge.id, "payment authorization created");
        Ok(PaymentAuthorization {
            payment_ref: charge.id,
            client_secret: charge.client_secret,
        })
    }

    #[instrument(skip(self), fields(payment_ref = %payment_ref, amount = %amount))]
    async fn refund(
        &self,
        payment_ref: &str,
        amount: Decimal,
    ) -> Result<RefundReceipt, PaymentGatewayError> {
        let response = self
            .request("/v1/refunds")
            .json(&serde_json::json!({
                "payment_ref": payment_ref,
                "amount": amount,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::read_failure(response).await;
            warn!(error = %err, "partial refund failed");
            return Err(err);
        }

        let refund: GatewayRefundResponse = response
            .json()
            .await
            .map_err(|e| PaymentGatewayError::Protocol(e.to_string()))?;
        info!(refund_id = %refund.id, "partial refund issued");
        Ok(RefundReceipt {
            refund_id: refund.id,
            amount: refund.amount,
        })
    }

    #[instrument(skip(self), fields(payment_ref = %payment_ref))]
    async fn void(&self, payment_ref: &str) -> Result<(), PaymentGatewayError> {
        let response = self
            .request(&format!("/v1/authorizations/{payment_ref}/void"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::read_failure(response).await);
        }
        Ok(())
    }
}
