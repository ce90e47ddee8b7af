pub mod delivery;
pub mod orders;
pub mod payment_webhooks;
pub mod substitutions;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    notifications::NotificationDispatcher, orders::OrderService, payments::PaymentGateway,
    pricing::PricingService, slots::SlotService, substitutions::SubstitutionService,
    zones::ZoneService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub substitutions: Arc<SubstitutionService>,
    pub slots: Arc<SlotService>,
    pub zones: Arc<ZoneService>,
    pub pricing: Arc<PricingService>,
}

impl AppServices {
    /// Wires the service graph. The payment gateway and notification
    /// dispatcher are injected so tests can substitute fakes.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
        operator_alert_email: String,
    ) -> Self {
        let slots = Arc::new(SlotService::new(db_pool.clone()));
        let zones = Arc::new(ZoneService::new(db_pool.clone()));
        let pricing = Arc::new(PricingService::new(db_pool.clone()));

        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            slots.clone(),
            zones.clone(),
            pricing.clone(),
            gateway.clone(),
            notifier.clone(),
        ));

        let substitutions = Arc::new(SubstitutionService::new(
            db_pool,
            event_sender,
            orders.clone(),
            gateway,
            notifier,
            operator_alert_email,
        ));

        Self {
            orders,
            substitutions,
            slots,
            zones,
            pricing,
        }
    }
}
