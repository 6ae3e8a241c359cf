use std::sync::Arc;
use std::time::Duration;
use tessera_booking::dispatch::NotificationDispatcher;
use tessera_booking::{CheckoutService, PaymentOrchestrator, TicketIssuer, TicketValidator};
use tessera_catalog::SalesPolicy;
use tessera_core::payment::PaymentAdapter;
use tessera_core::repository::TicketStore;
use tessera_shared::models::events::TicketValidatedEvent;
use tessera_store::app_config::BusinessRules;
use tessera_store::{DbClient, RedisClient};
use tokio::sync::broadcast;

use crate::metrics::TicketMetrics;
use crate::middleware::resiliency::ResiliencyState;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub worker_access_key: String,
    pub admin_access_key: String,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub db: Option<Arc<DbClient>>,
    pub redis: Option<Arc<RedisClient>>,
    pub payments: Arc<PaymentOrchestrator>,
    pub checkout: Arc<CheckoutService>,
    pub validator: Arc<TicketValidator>,
    pub checkin_tx: broadcast::Sender<TicketValidatedEvent>,
    pub metrics: Arc<TicketMetrics>,
    pub resiliency: Arc<ResiliencyState>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

impl AppState {
    /// Wire the ticketing services around a store and a payment gateway.
    pub fn new(
        store: Arc<dyn TicketStore>,
        gateway: Arc<dyn PaymentAdapter>,
        dispatcher: NotificationDispatcher,
        auth: AuthConfig,
        business_rules: BusinessRules,
        payment_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let policy = SalesPolicy::new(business_rules.checkin_window_hours);
        let payments = Arc::new(PaymentOrchestrator::new(gateway, payment_timeout));
        let issuer = Arc::new(TicketIssuer::new(store.clone(), dispatcher.clone(), policy));
        let checkout = Arc::new(CheckoutService::new(
            store.clone(),
            payments.clone(),
            issuer,
            dispatcher.clone(),
            policy,
            business_rules.max_tickets_per_booking,
        ));
        let validator = Arc::new(TicketValidator::new(store.clone(), dispatcher, policy));
        let (checkin_tx, _) = broadcast::channel(256);

        Ok(Self {
            store,
            db: None,
            redis: None,
            payments,
            checkout,
            validator,
            checkin_tx,
            metrics: Arc::new(TicketMetrics::new()?),
            resiliency: Arc::new(ResiliencyState::new()),
            auth,
            business_rules,
        })
    }

    pub fn with_database(mut self, db: Arc<DbClient>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>) -> Self {
        self.redis = Some(redis);
        self
    }
}
