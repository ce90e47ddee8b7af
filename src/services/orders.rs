use crate::{
    entities::{
        order::{self, Entity as Order, FulfillmentStatus, PaymentStatus},
        order_item::{self, Entity as OrderItem, SubstitutionStatus},
        product::Entity as Product,
        voucher::{self, Entity as Voucher},
        voucher_usage,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        notifications::{dispatch_detached, NotificationBuilder, NotificationDispatcher},
        payments::{AuthorizationRequest, PaymentGateway},
        pricing::{round_money, OwnerIdentity, PricingService, VoucherDecision, VoucherQuote},
        slots::SlotService,
        zones::ZoneService,
    },
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Hard cap on line items per order.
pub const MAX_ORDER_ITEMS: usize = 50;

const CURRENCY: &str = "GBP";
const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct DeliveryAddress {
    #[validate(length(min = 1, max = 120, message = "Recipient name is required"))]
    pub name: String,
    #[validate(length(min = 5, max = 30, message = "Phone number is required"))]
    pub phone: String,
    #[validate(length(min = 1, max = 200, message = "Address line 1 is required"))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 2, max = 12, message = "Postcode is required"))]
    pub postcode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    /// Registered owner; exclusive with `guest_email`.
    pub user_id: Option<Uuid>,
    /// Guest owner; exclusive with `user_id`.
    #[validate(email(message = "Guest email must be a valid email address"))]
    pub guest_email: Option<String>,

    #[validate(length(min = 1, max = 50, message = "An order needs between 1 and 50 items"))]
    pub items: Vec<CreateOrderItemRequest>,

    #[validate]
    pub address: DeliveryAddress,

    pub zone_id: Uuid,
    pub slot_id: Uuid,

    pub vat_number: Option<String>,
    pub po_number: Option<String>,
    pub voucher_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: FulfillmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
    pub substitution_product_id: Option<Uuid>,
    pub substitution_status: SubstitutionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub discounted_subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub address: DeliveryAddress,
    pub zone_id: Uuid,
    pub slot_id: Uuid,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub vat_number: Option<String>,
    pub po_number: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// A freshly placed order together with its payment authorization handle.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlacedOrder {
    pub order: OrderResponse,
    pub payment_ref: String,
}

/// Result of processing a payment-succeeded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// First delivery of the event: the order moved PENDING -> CONFIRMED.
    Confirmed { order_number: String },
    /// Repeat delivery (or a cancelled order): no state change, not an error.
    AlreadyProcessed,
    /// No order carries this authorization handle.
    UnknownPaymentRef,
}

/// Order intake, reads, operator status transitions and payment
/// reconciliation.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    slots: Arc<SlotService>,
    zones: Arc<ZoneService>,
    pricing: Arc<PricingService>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        slots: Arc<SlotService>,
        zones: Arc<ZoneService>,
        pricing: Arc<PricingService>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            event_sender,
            slots,
            zones,
            pricing,
            gateway,
            notifier,
        }
    }

    /// Creates an order: validates the request, prices the basket, applies a
    /// voucher, authorizes payment, then persists order + items, the slot
    /// booking claim and the voucher usage in one transaction.
    #[instrument(skip(self, request), fields(slot_id = %request.slot_id, zone_id = %request.zone_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<PlacedOrder, ServiceError> {
        request.validate()?;
        let owner = OwnerIdentity::from_parts(request.user_id, request.guest_email.as_deref())?;
        for item in &request.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for product {} must be a positive integer",
                    item.product_id
                )));
            }
        }

        // Fast capacity check; the authoritative claim happens inside the
        // persistence transaction.
        let slot = self.slots.get_bookable(request.slot_id).await?;
        let zone = self.zones.get_active(request.zone_id).await?;
        if !zone.matches_postcode(&request.address.postcode) {
            return Err(ServiceError::InvalidZone(format!(
                "zone {} does not serve postcode {}",
                zone.name, request.address.postcode
            )));
        }

        // Snapshot product names and prices at lookup time.
        let mut subtotal = Decimal::ZERO;
        let mut lines: Vec<(Uuid, String, Decimal, i32, Decimal)> = Vec::new();
        for item in &request.items {
            let product = Product::find_by_id(item.product_id)
                .one(&*self.db)
                .await?
                .filter(|p| p.is_available)
                .ok_or_else(|| {
                    ServiceError::ProductUnavailable(format!(
                        "product {} is not available",
                        item.product_id
                    ))
                })?;
            let line_total = round_money(product.price * Decimal::from(item.quantity));
            subtotal += line_total;
            lines.push((
                product.id,
                product.name,
                product.price,
                item.quantity,
                line_total,
            ));
        }
        subtotal = round_money(subtotal);

        if subtotal < zone.min_order {
            return Err(ServiceError::BelowMinimumOrder {
                subtotal,
                minimum: zone.min_order,
            });
        }

        let voucher_quote: Option<VoucherQuote> = match &request.voucher_code {
            Some(code) => match self.pricing.validate(code, &owner, subtotal).await? {
                VoucherDecision::Valid(quote) => Some(quote),
                VoucherDecision::Invalid(rejection) => {
                    return Err(ServiceError::InvalidVoucher(rejection.to_string()));
                }
            },
            None => None,
        };
        let discount_amount = voucher_quote
            .as_ref()
            .map(|q| q.discount_amount)
            .unwrap_or(Decimal::ZERO);

        let totals = PricingService::finalize_totals(subtotal, discount_amount, zone.delivery_fee);

        let order_number = self.allocate_order_number().await?;

        // Authorize before the transaction opens; no lock is ever held
        // across a network call.
        let authorization = self
            .gateway
            .authorize(AuthorizationRequest {
                order_number: order_number.clone(),
                amount: totals.total,
                currency: CURRENCY.to_string(),
                customer_email: owner.guest_email().map(String::from),
            })
            .await
            .map_err(ServiceError::from)?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let persisted: Result<(order::Model, Vec<order_item::Model>), ServiceError> = async {
            let txn = self.db.begin().await?;

            self.slots.claim_booking(&txn, request.slot_id).await?;

            let order_model = order::ActiveModel {
                id: Set(order_id),
                order_number: Set(order_number.clone()),
                user_id: Set(owner.user_id()),
                guest_email: Set(owner.guest_email().map(String::from)),
                subtotal: Set(totals.subtotal),
                discount_amount: Set(totals.discount_amount),
                discounted_subtotal: Set(totals.discounted_subtotal),
                delivery_fee: Set(totals.delivery_fee),
                total: Set(totals.total),
                currency: Set(CURRENCY.to_string()),
                delivery_name: Set(request.address.name.clone()),
                delivery_phone: Set(request.address.phone.clone()),
                address_line1: Set(request.address.line1.clone()),
                address_line2: Set(request.address.line2.clone()),
                city: Set(request.address.city.clone()),
                postcode: Set(request.address.postcode.clone()),
                zone_id: Set(zone.id),
                slot_id: Set(slot.id),
                payment_ref: Set(Some(authorization.payment_ref.clone())),
                payment_status: Set(PaymentStatus::Unpaid),
                fulfillment_status: Set(FulfillmentStatus::Pending),
                vat_number: Set(request.vat_number.clone()),
                po_number: Set(request.po_number.clone()),
                voucher_id: Set(voucher_quote.as_ref().map(|q| q.voucher.id)),
                created_at: Set(now),
                updated_at: Set(Some(now)),
                version: Set(1),
            }
            .insert(&txn)
            .await?;

            let mut item_models = Vec::with_capacity(lines.len());
            for (product_id, name, unit_price, quantity, line_total) in &lines {
                let item = order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_id: Set(*product_id),
                    name: Set(name.clone()),
                    unit_price: Set(*unit_price),
                    quantity: Set(*quantity),
                    total_price: Set(*line_total),
                    substitution_product_id: Set(None),
                    substitution_status: Set(SubstitutionStatus::None),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                }
                .insert(&txn)
                .await?;
                item_models.push(item);
            }

            if let Some(quote) = &voucher_quote {
                self.record_voucher_usage(&txn, quote, &owner, order_id, now)
                    .await?;
            }

            txn.commit().await?;
            Ok((order_model, item_models))
        }
        .await;

        let (order_model, item_models) = match persisted {
            Ok(models) => models,
            Err(e) => {
                // The charge exists but the order does not: release it so the
                // customer is never held against a phantom order.
                if let Err(void_err) = self.gateway.void(&authorization.payment_ref).await {
                    error!(
                        payment_ref = %authorization.payment_ref,
                        error = %void_err,
                        "failed to void authorization for unpersisted order"
                    );
                }
                return Err(e);
            }
        };

        info!(
            order_number = %order_model.order_number,
            total = %order_model.total,
            "order created"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::OrderCreated {
                order_id,
                order_number: order_model.order_number.clone(),
                total: order_model.total,
            })
            .await
        {
            warn!(error = %e, "failed to publish OrderCreated event");
        }

        dispatch_detached(
            self.notifier.clone(),
            NotificationBuilder::order_sync(&order_model),
        );

        Ok(PlacedOrder {
            order: Self::to_response(order_model, item_models),
            payment_ref: authorization.payment_ref,
        })
    }

    /// Reserves a unique order number: a timestamp for support lookups plus
    /// a random suffix. The unique index on `order_number` backstops the
    /// existence pre-check.
    async fn allocate_order_number(&self) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = generate_order_number();
            let taken = Order::find()
                .filter(order::Column::OrderNumber.eq(candidate.clone()))
                .count(&*self.db)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "could not allocate a unique order number".to_string(),
        ))
    }

    async fn record_voucher_usage(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        quote: &VoucherQuote,
        owner: &OwnerIdentity,
        order_id: Uuid,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        // The cap re-check rides on the same UPDATE that bumps the counter,
        // so two racing redemptions cannot both pass a stale read.
        let bumped = Voucher::update_many()
            .col_expr(
                voucher::Column::CurrentUses,
                Expr::col(voucher::Column::CurrentUses).add(1),
            )
            .filter(voucher::Column::Id.eq(quote.voucher.id))
            .filter(
                Condition::any()
                    .add(voucher::Column::MaxUses.is_null())
                    .add(
                        Expr::col(voucher::Column::CurrentUses)
                            .lt(Expr::col(voucher::Column::MaxUses)),
                    ),
            )
            .exec(txn)
            .await?;
        if bumped.rows_affected == 0 {
            return Err(ServiceError::InvalidVoucher(
                "voucher usage limit has been reached".to_string(),
            ));
        }

        let single_use_key = quote
            .voucher
            .one_time_per_user
            .then(|| format!("{}:{}", quote.voucher.id, owner.usage_key()));

        let inserted = voucher_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            voucher_id: Set(quote.voucher.id),
            user_id: Set(owner.user_id()),
            guest_email: Set(owner.guest_email().map(String::from)),
            order_id: Set(order_id),
            single_use_key: Set(single_use_key),
            redeemed_at: Set(now),
        }
        .insert(txn)
        .await;

        if let Err(e) = inserted {
            let msg = e.to_string().to_lowercase();
            if msg.contains("unique") || msg.contains("duplicate") {
                return Err(ServiceError::InvalidVoucher(
                    "voucher already used".to_string(),
                ));
            }
            return Err(ServiceError::DatabaseError(e));
        }
        Ok(())
    }

    /// Public read of a single order by its human-facing number.
    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let (order_model, items) = self.load_order_with_items(order_number).await?;
        Ok(Self::to_response(order_model, items))
    }

    pub(crate) async fn load_order(
        &self,
        order_number: &str,
    ) -> Result<order::Model, ServiceError> {
        Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))
    }

    async fn load_order_with_items(
        &self,
        order_number: &str,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let order_model = self.load_order(order_number).await?;
        let items = order_model
            .find_related(OrderItem)
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok((order_model, items))
    }

    /// Admin listing, newest first. Items are not expanded.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let paginator = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(OrderListResponse {
            orders: orders
                .into_iter()
                .map(|o| Self::to_response(o, Vec::new()))
                .collect(),
            total,
            page,
            per_page,
        })
    }

    /// Operator-driven fulfillment transition. PENDING -> CONFIRMED is
    /// reserved to payment reconciliation and rejected here; every other
    /// move must follow the transition table. Cancelling releases the slot
    /// booking in the same transaction.
    #[instrument(skip(self), fields(order_number = %order_number))]
    pub async fn update_order_status(
        &self,
        order_number: &str,
        new_status: FulfillmentStatus,
    ) -> Result<OrderResponse, ServiceError> {
        if new_status == FulfillmentStatus::Confirmed {
            return Err(ServiceError::InvalidOperation(
                "orders are confirmed by payment reconciliation, not status updates".to_string(),
            ));
        }

        let order_model = self.load_order(order_number).await?;
        let current = order_model.fulfillment_status;
        if !current.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition {
                from: current.to_string(),
                to: new_status.to_string(),
            });
        }

        let slot_id = order_model.slot_id;
        let order_id = order_model.id;

        let txn = self.db.begin().await?;
        let mut active: order::ActiveModel = order_model.into();
        let version = active.version.take().unwrap_or(1);
        active.version = Set(version + 1);
        active.fulfillment_status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await?;

        if new_status == FulfillmentStatus::Cancelled {
            self.slots.release_booking(&txn, slot_id).await?;
        }
        txn.commit().await?;

        info!(
            order_number = %updated.order_number,
            from = %current,
            to = %new_status,
            "order status updated"
        );

        let event = if new_status == FulfillmentStatus::Cancelled {
            Event::OrderCancelled {
                order_id,
                order_number: updated.order_number.clone(),
            }
        } else {
            Event::OrderStatusChanged {
                order_id,
                old_status: current.to_string(),
                new_status: new_status.to_string(),
            }
        };
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "failed to publish status change event");
        }

        // PACKED and OUT_FOR_DELIVERY are the customer-visible milestones;
        // the latter carries the delivery window.
        match new_status {
            FulfillmentStatus::Packed => {
                dispatch_detached(
                    self.notifier.clone(),
                    NotificationBuilder::status_update(&updated, &new_status.to_string(), None),
                );
            }
            FulfillmentStatus::OutForDelivery => {
                let window = self
                    .slots
                    .get(slot_id)
                    .await?
                    .map(|s| s.window_label())
                    .unwrap_or_else(|| "unscheduled".to_string());
                dispatch_detached(
                    self.notifier.clone(),
                    NotificationBuilder::status_update(
                        &updated,
                        &new_status.to_string(),
                        Some(&window),
                    ),
                );
            }
            _ => {}
        }

        Ok(Self::to_response(updated, Vec::new()))
    }

    /// Applies a verified payment-succeeded notification. Idempotent: the
    /// UPDATE only fires while the order is still UNPAID and PENDING, so
    /// at-least-once webhook delivery cannot double-confirm or re-confirm a
    /// cancelled order.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        payment_ref: &str,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        let Some(order_model) = Order::find()
            .filter(order::Column::PaymentRef.eq(payment_ref))
            .one(&*self.db)
            .await?
        else {
            warn!(payment_ref = %payment_ref, "payment notification for unknown authorization");
            return Ok(ReconciliationOutcome::UnknownPaymentRef);
        };

        let result = Order::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::Paid))
            .col_expr(
                order::Column::FulfillmentStatus,
                Expr::value(FulfillmentStatus::Confirmed),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_model.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Unpaid))
            .filter(order::Column::FulfillmentStatus.eq(FulfillmentStatus::Pending))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            info!(
                order_number = %order_model.order_number,
                "payment notification replay absorbed"
            );
            return Ok(ReconciliationOutcome::AlreadyProcessed);
        }

        let (confirmed, items) = self.load_order_with_items(&order_model.order_number).await?;
        let window = self
            .slots
            .get(confirmed.slot_id)
            .await?
            .map(|s| s.window_label())
            .unwrap_or_else(|| "unscheduled".to_string());

        info!(order_number = %confirmed.order_number, "order confirmed by payment webhook");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderConfirmed {
                order_id: confirmed.id,
                order_number: confirmed.order_number.clone(),
            })
            .await
        {
            warn!(error = %e, "failed to publish OrderConfirmed event");
        }

        dispatch_detached(
            self.notifier.clone(),
            NotificationBuilder::order_confirmation(&confirmed, &items, &window),
        );

        Ok(ReconciliationOutcome::Confirmed {
            order_number: confirmed.order_number,
        })
    }

    pub(crate) fn to_response(
        model: order::Model,
        items: Vec<order_item::Model>,
    ) -> OrderResponse {
        OrderResponse {
            id: model.id,
            order_number: model.order_number,
            user_id: model.user_id,
            guest_email: model.guest_email,
            subtotal: model.subtotal,
            discount_amount: model.discount_amount,
            discounted_subtotal: model.discounted_subtotal,
            delivery_fee: model.delivery_fee,
            total: model.total,
            currency: model.currency,
            address: DeliveryAddress {
                name: model.delivery_name,
                phone: model.delivery_phone,
                line1: model.address_line1,
                line2: model.address_line2,
                city: model.city,
                postcode: model.postcode,
            },
            zone_id: model.zone_id,
            slot_id: model.slot_id,
            payment_status: model.payment_status,
            fulfillment_status: model.fulfillment_status,
            vat_number: model.vat_number,
            po_number: model.po_number,
            items: items
                .into_iter()
                .map(|i| OrderItemResponse {
                    id: i.id,
                    product_id: i.product_id,
                    name: i.name,
                    unit_price: i.unit_price,
                    quantity: i.quantity,
                    total_price: i.total_price,
                    substitution_product_id: i.substitution_product_id,
                    substitution_status: i.substitution_status,
                })
                .collect(),
            created_at: model.created_at,
        }
    }
}

fn generate_order_number() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("GR-{timestamp}-{suffix:04}")
}
