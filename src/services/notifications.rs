use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::entities::{order, order_item};

/// Categories of outbound messages. The rendering (email templates, CRM
/// payload mapping) lives in the notification service, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    OrderSync,
    OrderConfirmation,
    StatusUpdate,
    SubstitutionOffer,
    RefundConfirmation,
    OperatorAlert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    pub payload: serde_json::Value,
    pub high_priority: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport failure: {0}")]
    Transport(String),
    #[error("notification service rejected message: {0}")]
    Rejected(String),
}

/// Outbound transactional email / CRM boundary. Every dispatch in the order
/// workflows is fire-and-forget; failures are logged and swallowed.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, message: NotificationMessage) -> Result<(), NotificationError>;
}

/// Spawns the dispatch as a detached task. The caller never awaits it and a
/// failure can only reach the logs.
pub fn dispatch_detached(dispatcher: Arc<dyn NotificationDispatcher>, message: NotificationMessage) {
    tokio::spawn(async move {
        let kind = message.kind;
        if let Err(e) = dispatcher.dispatch(message).await {
            error!(kind = %kind, error = %e, "notification dispatch failed");
        }
    });
}

/// Message constructors for each hook in the order workflows.
pub struct NotificationBuilder;

impl NotificationBuilder {
    fn order_recipient(order: &order::Model) -> String {
        match (&order.guest_email, order.user_id) {
            (Some(email), _) => email.clone(),
            (None, Some(user_id)) => format!("user:{user_id}"),
            (None, None) => "unknown".to_string(),
        }
    }

    fn items_snapshot(items: &[order_item::Model]) -> serde_json::Value {
        json!(items
            .iter()
            .map(|i| {
                json!({
                    "name": i.name,
                    "quantity": i.quantity,
                    "unit_price": i.unit_price,
                    "total_price": i.total_price,
                })
            })
            .collect::<Vec<_>>())
    }

    /// CRM contact/deal sync fired when an order is created.
    pub fn order_sync(order: &order::Model) -> NotificationMessage {
        NotificationMessage {
            kind: NotificationKind::OrderSync,
            recipient: Self::order_recipient(order),
            subject: format!("Order {} received", order.order_number),
            payload: json!({
                "order_number": order.order_number,
                "total": order.total,
                "postcode": order.postcode,
            }),
            high_priority: false,
        }
    }

    /// Confirmation email with the full item/total/delivery-window snapshot.
    pub fn order_confirmation(
        order: &order::Model,
        items: &[order_item::Model],
        delivery_window: &str,
    ) -> NotificationMessage {
        NotificationMessage {
            kind: NotificationKind::OrderConfirmation,
            recipient: Self::order_recipient(order),
            subject: format!("Order {} confirmed", order.order_number),
            payload: json!({
                "order_number": order.order_number,
                "items": Self::items_snapshot(items),
                "subtotal": order.subtotal,
                "discount_amount": order.discount_amount,
                "delivery_fee": order.delivery_fee,
                "total": order.total,
                "delivery_window": delivery_window,
            }),
            high_priority: false,
        }
    }

    pub fn status_update(
        order: &order::Model,
        new_status: &str,
        delivery_window: Option<&str>,
    ) -> NotificationMessage {
        NotificationMessage {
            kind: NotificationKind::StatusUpdate,
            recipient: Self::order_recipient(order),
            subject: format!("Order {} is {}", order.order_number, new_status),
            payload: json!({
                "order_number": order.order_number,
                "status": new_status,
                "delivery_window": delivery_window,
            }),
            high_priority: false,
        }
    }

    /// Accept/refund choice offer for an out-of-stock line item.
    pub fn substitution_offer(
        order: &order::Model,
        item: &order_item::Model,
        substitute_name: &str,
    ) -> NotificationMessage {
        NotificationMessage {
            kind: NotificationKind::SubstitutionOffer,
            recipient: Self::order_recipient(order),
            subject: format!("A substitution is proposed on order {}", order.order_number),
            payload: json!({
                "order_number": order.order_number,
                "item_id": item.id,
                "original_product": item.name,
                "substitute_product": substitute_name,
                "respond_url": format!(
                    "/orders/substitution/{}/{}/respond",
                    order.order_number, item.id
                ),
            }),
            high_priority: false,
        }
    }

    pub fn refund_confirmation(
        order: &order::Model,
        item: &order_item::Model,
        amount: Decimal,
    ) -> NotificationMessage {
        NotificationMessage {
            kind: NotificationKind::RefundConfirmation,
            recipient: Self::order_recipient(order),
            subject: format!("Refund issued on order {}", order.order_number),
            payload: json!({
                "order_number": order.order_number,
                "item_id": item.id,
                "product": item.name,
                "amount": amount,
            }),
            high_priority: false,
        }
    }

    /// High-priority escalation when a promised refund could not be executed.
    pub fn operator_alert(
        alert_email: &str,
        order_number: &str,
        item_id: Uuid,
        amount: Decimal,
        gateway_error: &str,
    ) -> NotificationMessage {
        NotificationMessage {
            kind: NotificationKind::OperatorAlert,
            recipient: alert_email.to_string(),
            subject: format!("ACTION REQUIRED: refund failed on order {order_number}"),
            payload: json!({
                "order_number": order_number,
                "item_id": item_id,
                "amount": amount,
                "gateway_error": gateway_error,
            }),
            high_priority: true,
        }
    }
}

/// HTTP dispatcher posting messages to the notification service. With no
/// service URL configured (local development) messages are logged and
/// dropped.
#[derive(Clone)]
pub struct HttpNotificationDispatcher {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl HttpNotificationDispatcher {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build notification HTTP client"),
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    #[instrument(skip(self, message), fields(kind = %message.kind, recipient = %message.recipient))]
    async fn dispatch(&self, message: NotificationMessage) -> Result<(), NotificationError> {
        let Some(base_url) = &self.base_url else {
            debug!(kind = %message.kind, "notification service not configured; dropping message");
            return Ok(());
        };

        let mut request = self
            .client
            .post(format!("{base_url}/v1/messages"))
            .json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected(format!("{status}: {detail}")));
        }
        Ok(())
    }
}
