use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Domain events published by the order workflows. Consumers are strictly
/// observational; no workflow awaits event processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        total: Decimal,
    },
    OrderConfirmed {
        order_id: Uuid,
        order_number: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        order_number: String,
    },
    SubstitutionOffered {
        order_id: Uuid,
        item_id: Uuid,
        substitution_product_id: Uuid,
    },
    SubstitutionAccepted {
        order_id: Uuid,
        item_id: Uuid,
        new_total: Decimal,
    },
    SubstitutionRefunded {
        order_id: Uuid,
        item_id: Uuid,
        amount: Decimal,
    },
    RefundEscalated {
        order_id: Uuid,
        item_id: Uuid,
        amount: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. A full or closed channel is reported
    /// as an error string; callers log and continue.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background consumer for the event channel. Currently logs each event;
/// this is the seam where downstream projections would attach.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("event processor started");
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated {
                order_number,
                total,
                ..
            } => {
                info!(%order_number, %total, "order created");
            }
            Event::OrderConfirmed { order_number, .. } => {
                info!(%order_number, "order confirmed");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::OrderCancelled { order_number, .. } => {
                info!(%order_number, "order cancelled");
            }
            Event::RefundEscalated {
                order_id,
                item_id,
                amount,
            } => {
                info!(%order_id, %item_id, %amount, "refund escalated to manual processing");
            }
            other => debug!(event = ?other, "event processed"),
        }
    }
    info!("event processor stopped");
}
