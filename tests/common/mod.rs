#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use grocerly_api::{
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    entities::{delivery_slot, delivery_zone, product, voucher, voucher_usage},
    events::{self, EventSender},
    handlers::AppServices,
    services::notifications::{NotificationDispatcher, NotificationError, NotificationKind,
        NotificationMessage},
    services::payments::{
        AuthorizationRequest, PaymentAuthorization, PaymentGateway, PaymentGatewayError,
        RefundReceipt,
    },
    AppState,
};

/// Payment gateway fake: records every call and can be told to decline
/// authorizations or fail refunds.
pub struct FakePaymentGateway {
    pub authorize_calls: AtomicU32,
    pub refund_calls: AtomicU32,
    pub void_calls: AtomicU32,
    pub decline_authorize: AtomicBool,
    pub fail_refund: AtomicBool,
    pub refunds: Mutex<Vec<(String, Decimal)>>,
}

impl FakePaymentGateway {
    pub fn new() -> Self {
        Self {
            authorize_calls: AtomicU32::new(0),
            refund_calls: AtomicU32::new(0),
            void_calls: AtomicU32::new(0),
            decline_authorize: AtomicBool::new(false),
            fail_refund: AtomicBool::new(false),
            refunds: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail_refund(&self, fail: bool) {
        self.fail_refund.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<PaymentAuthorization, PaymentGatewayError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        if self.decline_authorize.load(Ordering::SeqCst) {
            return Err(PaymentGatewayError::Declined("card declined".to_string()));
        }
        Ok(PaymentAuthorization {
            payment_ref: format!("pay_{}_{}", request.order_number, Uuid::new_v4().simple()),
            client_secret: None,
        })
    }

    async fn refund(
        &self,
        payment_ref: &str,
        amount: Decimal,
    ) -> Result<RefundReceipt, PaymentGatewayError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(PaymentGatewayError::Transport(
                "gateway timed out".to_string(),
            ));
        }
        self.refunds
            .lock()
            .unwrap()
            .push((payment_ref.to_string(), amount));
        Ok(RefundReceipt {
            refund_id: format!("re_{}", Uuid::new_v4().simple()),
            amount,
        })
    }

    async fn void(&self, _payment_ref: &str) -> Result<(), PaymentGatewayError> {
        self.void_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Notification fake that records every dispatched message.
pub struct RecordingDispatcher {
    pub messages: Mutex<Vec<NotificationMessage>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.kind == kind)
            .count()
    }

    pub fn last_of(&self, kind: NotificationKind) -> Option<NotificationMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.kind == kind)
            .cloned()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, message: NotificationMessage) -> Result<(), NotificationError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

/// Service-level harness over a file-backed SQLite database with fakes at
/// both external seams.
pub struct TestHarness {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub event_sender: EventSender,
    pub gateway: Arc<FakePaymentGateway>,
    pub notifier: Arc<RecordingDispatcher>,
    _tmp: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().expect("temp dir");
        let db_path = tmp.path().join("grocerly_test.db");
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", db_path.display()),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("test database");
        db::run_migrations(&pool).await.expect("migrations");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(FakePaymentGateway::new());
        let notifier = Arc::new(RecordingDispatcher::new());

        let services = AppServices::new(
            db.clone(),
            Arc::new(event_sender.clone()),
            gateway.clone(),
            notifier.clone(),
            "ops@grocerly.test".to_string(),
        );

        Self {
            db,
            services,
            event_sender,
            gateway,
            notifier,
            _tmp: tmp,
            _event_task: event_task,
        }
    }

    /// Assembles an `AppState` for HTTP-level tests.
    pub fn app_state(&self, webhook_secret: Option<String>) -> AppState {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.payment_webhook_secret = webhook_secret;
        AppState {
            db: self.db.clone(),
            config: cfg,
            event_sender: self.event_sender.clone(),
            services: self.services.clone(),
        }
    }

    /// Detached notification dispatch lands on a spawned task; poll until
    /// the expected count arrives instead of guessing at sleeps.
    pub async fn wait_for_notifications(&self, kind: NotificationKind, expected: usize) {
        for _ in 0..100 {
            if self.notifier.count(kind) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} {kind} notifications, saw {}",
            self.notifier.count(kind)
        );
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            is_available: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_unavailable_product(&self, name: &str) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(Decimal::ONE),
            is_available: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_zone(
        &self,
        prefixes: &str,
        delivery_fee: Decimal,
        min_order: Decimal,
    ) -> delivery_zone::Model {
        delivery_zone::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("Zone {prefixes}")),
            postcode_prefixes: Set(prefixes.to_string()),
            delivery_fee: Set(delivery_fee),
            min_order: Set(min_order),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed zone")
    }

    pub async fn seed_slot(&self, max_orders: i32) -> delivery_slot::Model {
        self.seed_slot_on(
            Utc::now().date_naive() + ChronoDuration::days(2),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            max_orders,
        )
        .await
    }

    pub async fn seed_slot_on(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        max_orders: i32,
    ) -> delivery_slot::Model {
        delivery_slot::ActiveModel {
            id: Set(Uuid::new_v4()),
            slot_date: Set(date),
            start_time: Set(start),
            end_time: Set(end),
            max_orders: Set(max_orders),
            current_bookings: Set(0),
            is_available: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed slot")
    }

    pub async fn seed_voucher(
        &self,
        code: &str,
        voucher_type: voucher::VoucherType,
        value: Decimal,
        min_order: Decimal,
        one_time_per_user: bool,
    ) -> voucher::Model {
        voucher::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_uppercase()),
            voucher_type: Set(voucher_type),
            value: Set(value),
            min_order: Set(min_order),
            valid_from: Set(Utc::now() - ChronoDuration::days(1)),
            valid_until: Set(Utc::now() + ChronoDuration::days(30)),
            max_uses: Set(None),
            current_uses: Set(0),
            one_time_per_user: Set(one_time_per_user),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed voucher")
    }

    pub async fn seed_usage(
        &self,
        voucher_model: &voucher::Model,
        guest_email: &str,
    ) -> voucher_usage::Model {
        voucher_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            voucher_id: Set(voucher_model.id),
            user_id: Set(None),
            guest_email: Set(Some(guest_email.to_lowercase())),
            order_id: Set(Uuid::new_v4()),
            single_use_key: Set(voucher_model
                .one_time_per_user
                .then(|| format!("{}:guest:{}", voucher_model.id, guest_email.to_lowercase()))),
            redeemed_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed voucher usage")
    }
}

use grocerly_api::services::orders::{
    CreateOrderItemRequest, CreateOrderRequest, DeliveryAddress,
};

/// A well-formed guest order request against the given zone/slot/products.
pub fn order_request(
    guest_email: &str,
    postcode: &str,
    zone_id: Uuid,
    slot_id: Uuid,
    items: Vec<(Uuid, i32)>,
    voucher_code: Option<&str>,
) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id: None,
        guest_email: Some(guest_email.to_string()),
        items: items
            .into_iter()
            .map(|(product_id, quantity)| CreateOrderItemRequest {
                product_id,
                quantity,
            })
            .collect(),
        address: DeliveryAddress {
            name: "Test Customer".to_string(),
            phone: "07700900000".to_string(),
            line1: "1 Market Street".to_string(),
            line2: None,
            city: "London".to_string(),
            postcode: postcode.to_string(),
        },
        zone_id,
        slot_id,
        vat_number: None,
        po_number: None,
        voucher_code: voucher_code.map(String::from),
    }
}
