use crate::{
    entities::{
        order::{self, PaymentStatus},
        order_item::{self, Entity as OrderItem, SubstitutionStatus},
        product::Entity as Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        notifications::{dispatch_detached, NotificationBuilder, NotificationDispatcher},
        orders::{OrderItemResponse, OrderResponse, OrderService},
        payments::PaymentGateway,
        pricing::{round_money, PricingService},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Customer's decision on an offered substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubstitutionOutcome {
    Accepted,
    Refunded,
}

/// Out-of-stock replacement negotiation for a single line item, including
/// the money-handling failure path: a refund the gateway would not execute
/// leaves the item actionable and escalates to an operator instead of
/// reporting false success.
#[derive(Clone)]
pub struct SubstitutionService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    orders: Arc<OrderService>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationDispatcher>,
    alert_email: String,
}

impl SubstitutionService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        orders: Arc<OrderService>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
        alert_email: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            orders,
            gateway,
            notifier,
            alert_email,
        }
    }

    async fn load_item(
        &self,
        order_model: &order::Model,
        item_id: Uuid,
    ) -> Result<order_item::Model, ServiceError> {
        OrderItem::find_by_id(item_id)
            .filter(order_item::Column::OrderId.eq(order_model.id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Item {} not found on order {}",
                    item_id, order_model.order_number
                ))
            })
    }

    /// Operator proposes a replacement product for a line item. Re-offering
    /// is allowed while no customer response exists; a settled item rejects.
    #[instrument(skip(self), fields(order_number = %order_number, item_id = %item_id))]
    pub async fn offer_substitution(
        &self,
        order_number: &str,
        item_id: Uuid,
        substitution_product_id: Uuid,
    ) -> Result<OrderItemResponse, ServiceError> {
        let order_model = self.orders.load_order(order_number).await?;
        let item = self.load_item(&order_model, item_id).await?;

        if item.substitution_status.is_settled() {
            return Err(ServiceError::AlreadyProcessed(format!(
                "substitution on item {} was already {}",
                item_id, item.substitution_status
            )));
        }

        let substitute = Product::find_by_id(substitution_product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_available)
            .ok_or_else(|| {
                ServiceError::ProductUnavailable(format!(
                    "substitute product {substitution_product_id} is not available"
                ))
            })?;

        let mut active: order_item::ActiveModel = item.into();
        active.substitution_product_id = Set(Some(substitute.id));
        active.substitution_status = Set(SubstitutionStatus::Pending);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        info!(
            order_number = %order_model.order_number,
            substitute = %substitute.name,
            "substitution offered"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::SubstitutionOffered {
                order_id: order_model.id,
                item_id,
                substitution_product_id: substitute.id,
            })
            .await
        {
            warn!(error = %e, "failed to publish SubstitutionOffered event");
        }

        dispatch_detached(
            self.notifier.clone(),
            NotificationBuilder::substitution_offer(&order_model, &updated, &substitute.name),
        );

        Ok(item_response(updated))
    }

    /// Customer resolves a pending substitution with ACCEPT or REFUND.
    #[instrument(skip(self), fields(order_number = %order_number, item_id = %item_id, outcome = ?outcome))]
    pub async fn respond_to_substitution(
        &self,
        order_number: &str,
        item_id: Uuid,
        outcome: SubstitutionOutcome,
    ) -> Result<OrderResponse, ServiceError> {
        let order_model = self.orders.load_order(order_number).await?;
        let item = self.load_item(&order_model, item_id).await?;

        if item.substitution_status != SubstitutionStatus::Pending {
            return Err(ServiceError::AlreadyProcessed(format!(
                "item {} has no pending substitution (status {})",
                item_id, item.substitution_status
            )));
        }

        match outcome {
            SubstitutionOutcome::Accepted => self.accept(order_model, item).await,
            SubstitutionOutcome::Refunded => self.refund(order_model, item).await,
        }
    }

    /// Swaps the snapshot to the replacement product at its current price
    /// and reprices the whole order in one transaction. The original
    /// discount amount is preserved, so the total moves by exactly the line
    /// delta.
    async fn accept(
        &self,
        order_model: order::Model,
        item: order_item::Model,
    ) -> Result<OrderResponse, ServiceError> {
        let substitution_product_id = item.substitution_product_id.ok_or_else(|| {
            ServiceError::InvalidOperation(format!(
                "item {} is pending without a substitute product",
                item.id
            ))
        })?;
        let substitute = Product::find_by_id(substitution_product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ProductUnavailable(format!(
                    "substitute product {substitution_product_id} no longer exists"
                ))
            })?;

        let now = Utc::now();
        let item_id = item.id;
        let order_id = order_model.id;
        let new_line_total = round_money(substitute.price * Decimal::from(item.quantity));

        let txn = self.db.begin().await?;

        let mut item_active: order_item::ActiveModel = item.into();
        item_active.name = Set(substitute.name.clone());
        item_active.unit_price = Set(substitute.price);
        item_active.total_price = Set(new_line_total);
        item_active.substitution_status = Set(SubstitutionStatus::Accepted);
        item_active.updated_at = Set(Some(now));
        item_active.update(&txn).await?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&txn)
            .await?;
        let subtotal = round_money(items.iter().map(|i| i.total_price).sum::<Decimal>());
        let totals = PricingService::finalize_totals(
            subtotal,
            order_model.discount_amount,
            order_model.delivery_fee,
        );

        let mut order_active: order::ActiveModel = order_model.into();
        let version = order_active.version.take().unwrap_or(1);
        order_active.version = Set(version + 1);
        order_active.subtotal = Set(totals.subtotal);
        order_active.discounted_subtotal = Set(totals.discounted_subtotal);
        order_active.total = Set(totals.total);
        order_active.updated_at = Set(Some(now));
        let updated_order = order_active.update(&txn).await?;

        txn.commit().await?;

        info!(
            order_number = %updated_order.order_number,
            new_total = %updated_order.total,
            "substitution accepted"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::SubstitutionAccepted {
                order_id,
                item_id,
                new_total: updated_order.total,
            })
            .await
        {
            warn!(error = %e, "failed to publish SubstitutionAccepted event");
        }

        Ok(OrderService::to_response(updated_order, items))
    }

    /// Requests a partial refund for exactly the line total. On gateway
    /// failure the item is put back to PENDING, an operator is alerted and
    /// the caller gets a distinct escalation error; the customer is never
    /// told a refund succeeded unless the gateway confirmed it.
    async fn refund(
        &self,
        order_model: order::Model,
        item: order_item::Model,
    ) -> Result<OrderResponse, ServiceError> {
        if order_model.payment_status != PaymentStatus::Paid {
            return Err(ServiceError::PaymentNotCompleted(format!(
                "order {} has not been paid; nothing to refund",
                order_model.order_number
            )));
        }
        let payment_ref = order_model.payment_ref.clone().ok_or_else(|| {
            ServiceError::PaymentNotCompleted(format!(
                "order {} has no payment authorization on record",
                order_model.order_number
            ))
        })?;

        let amount = item.total_price;
        let item_id = item.id;
        let order_id = order_model.id;

        match self.gateway.refund(&payment_ref, amount).await {
            Ok(receipt) => {
                let mut active: order_item::ActiveModel = item.into();
                active.substitution_status = Set(SubstitutionStatus::Refunded);
                active.updated_at = Set(Some(Utc::now()));
                let updated_item = active.update(&*self.db).await?;

                info!(
                    order_number = %order_model.order_number,
                    refund_id = %receipt.refund_id,
                    amount = %amount,
                    "substitution refunded"
                );

                if let Err(e) = self
                    .event_sender
                    .send(Event::SubstitutionRefunded {
                        order_id,
                        item_id,
                        amount,
                    })
                    .await
                {
                    warn!(error = %e, "failed to publish SubstitutionRefunded event");
                }

                dispatch_detached(
                    self.notifier.clone(),
                    NotificationBuilder::refund_confirmation(&order_model, &updated_item, amount),
                );

                let items = OrderItem::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .order_by_asc(order_item::Column::CreatedAt)
                    .all(&*self.db)
                    .await?;
                Ok(OrderService::to_response(order_model, items))
            }
            Err(gateway_err) => {
                error!(
                    order_number = %order_model.order_number,
                    item_id = %item_id,
                    amount = %amount,
                    error = %gateway_err,
                    "refund failed at the gateway; escalating"
                );

                // Keep the item actionable rather than silently stuck.
                let mut active: order_item::ActiveModel = item.into();
                active.substitution_status = Set(SubstitutionStatus::Pending);
                active.updated_at = Set(Some(Utc::now()));
                active.update(&*self.db).await?;

                let alert = NotificationBuilder::operator_alert(
                    &self.alert_email,
                    &order_model.order_number,
                    item_id,
                    amount,
                    &gateway_err.to_string(),
                );
                if let Err(e) = self.notifier.dispatch(alert).await {
                    error!(error = %e, "failed to deliver refund escalation alert");
                }

                if let Err(e) = self
                    .event_sender
                    .send(Event::RefundEscalated {
                        order_id,
                        item_id,
                        amount,
                    })
                    .await
                {
                    warn!(error = %e, "failed to publish RefundEscalated event");
                }

                Err(ServiceError::RefundEscalated {
                    order_number: order_model.order_number,
                    item_id,
                })
            }
        }
    }
}

fn item_response(item: order_item::Model) -> OrderItemResponse {
    OrderItemResponse {
        id: item.id,
        product_id: item.product_id,
        name: item.name,
        unit_price: item.unit_price,
        quantity: item.quantity,
        total_price: item.total_price,
        substitution_product_id: item.substitution_product_id,
        substitution_status: item.substitution_status,
    }
}
