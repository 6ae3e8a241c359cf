use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tessera_api::{app, AppState, AuthConfig};
use tessera_booking::dispatch::{TracingAttendanceLog, TracingNotifier};
use tessera_booking::{MockPaymentAdapter, NotificationDispatcher, RetryPolicy};
use tessera_core::notify::{AttendanceLog, NotificationService};
use tessera_core::repository::TicketStore;
use tessera_core::webhook::WebhookVerifier;
use tessera_store::app_config::Config;
use tessera_store::{DbClient, EventProducer, KafkaAttendanceLog, KafkaNotifier, MemoryStore, PgStore, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera_api=debug,tessera_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tessera API on port {}", config.server.port);

    let (store, db): (Arc<dyn TicketStore>, Option<Arc<DbClient>>) = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url).await.context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            (Arc::new(PgStore::new(db.pool.clone())), Some(Arc::new(db)))
        }
        None => {
            tracing::warn!("No database configured, using the in-memory store");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(RedisClient::new(url).await.context("Failed to connect to Redis")?)),
        None => None,
    };

    let (notifier, attendance): (Arc<dyn NotificationService>, Arc<dyn AttendanceLog>) = match &config.kafka.brokers {
        Some(brokers) => {
            let producer = EventProducer::new(brokers).context("Failed to create Kafka producer")?;
            (
                Arc::new(KafkaNotifier::new(producer.clone())),
                Arc::new(KafkaAttendanceLog::new(producer)),
            )
        }
        None => (Arc::new(TracingNotifier), Arc::new(TracingAttendanceLog)),
    };

    let rules = config.business_rules.clone();
    let (dispatcher, _worker) = NotificationDispatcher::spawn(
        notifier,
        attendance,
        RetryPolicy::new(
            rules.notification_max_attempts,
            Duration::from_millis(rules.notification_backoff_ms),
        ),
        rules.notification_queue_capacity,
    );

    tracing::warn!("Payments go through the mock gateway");
    let gateway = Arc::new(MockPaymentAdapter::new(WebhookVerifier::new(
        &config.payment.webhook_secret,
        config.payment.webhook_tolerance_seconds,
    )));

    let mut state = AppState::new(
        store,
        gateway,
        dispatcher,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
            worker_access_key: config.auth.worker_access_key.clone(),
            admin_access_key: config.auth.admin_access_key.clone(),
        },
        rules,
        Duration::from_millis(config.payment.timeout_ms),
    )?;
    if let Some(db) = db {
        state = state.with_database(db);
    }
    if let Some(redis) = redis {
        state = state.with_redis(redis);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
