use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reward_ledger::application::actors::{spawn_event_consumer, spawn_price_refresher, RefresherMessage};
use reward_ledger::application::handlers::{router, AppState};
use reward_ledger::config::{AppConfig, CacheBackend};
use reward_ledger::domain::repositories::{EventPublisher, SharedCache};
use reward_ledger::domain::services::reward_service::RewardService;
use reward_ledger::infrastructure::event_publishers::{ChannelPublisher, LoggingPublisher, WebhookPublisher};
use reward_ledger::infrastructure::memory_cache::InMemoryCache;
use reward_ledger::infrastructure::simulated_quotes::SimulatedQuoteSource;
use reward_ledger::persistence::cache_repository::SqliteCache;
use reward_ledger::persistence::init_database_with_config;
use reward_ledger::persistence::ledger_repository::SqliteLedgerStore;
use reward_ledger::rate_limit::{create_rate_limiter, spawn_rate_limiter_pruner, RateLimiterConfig};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reward_ledger=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    info!("Starting reward ledger on {}", config.bind_addr);

    let pool = init_database_with_config(&config.database).await?;
    info!("Database ready at {}", config.database.url);

    let cache: Arc<dyn SharedCache> = match config.cache_backend {
        CacheBackend::Sqlite => Arc::new(SqliteCache::new(pool.clone())),
        CacheBackend::Memory => {
            warn!("Using in-process cache; idempotency and prices are not shared across instances");
            Arc::new(InMemoryCache::new())
        }
    };

    let mut consumer = None;
    let publisher: Arc<dyn EventPublisher> = match config.event_webhook_url.as_deref() {
        Some(url) => match WebhookPublisher::new(url, config.publish_timeout()) {
            Ok(webhook) => {
                info!("Publishing reward events to {}", url);
                Arc::new(webhook)
            }
            Err(e) => {
                error!("Invalid event webhook '{}': {}; falling back to log output", url, e);
                Arc::new(LoggingPublisher)
            }
        },
        None => {
            let (channel, rx) = ChannelPublisher::channel(EVENT_CHANNEL_CAPACITY);
            consumer = Some(spawn_event_consumer(rx));
            Arc::new(channel)
        }
    };

    let service = Arc::new(RewardService::new(
        Arc::new(SqliteLedgerStore::new(pool.clone())),
        cache,
        Arc::new(SimulatedQuoteSource::new()),
        publisher,
        config.service_config(),
    ));

    let (refresher_tx, refresher_handle) = spawn_price_refresher(
        service.price_cache(),
        config.tracked_symbols.clone(),
        config.price_refresh_interval(),
    );

    let limiter = create_rate_limiter(RateLimiterConfig {
        requests_per_minute: config.rate_limit_per_minute,
    });
    let pruner = spawn_rate_limiter_pruner(limiter.clone(), RATE_LIMIT_PRUNE_INTERVAL);
    let app = router(
        AppState {
            service: service.clone(),
        },
        limiter,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    // Set up graceful shutdown
    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutting down gracefully...");
    pruner.abort();

    if refresher_tx.send(RefresherMessage::Shutdown).await.is_err() {
        warn!("Price refresher already stopped");
    }
    if let Err(e) = refresher_handle.await {
        error!("Price refresher task failed: {}", e);
    }

    // Dropping the service closes the event channel and lets the consumer drain
    drop(service);
    if let Some(handle) = consumer {
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(count)) => info!("Delivered {} reward events", count),
            Ok(Err(e)) => error!("Event consumer task failed: {}", e),
            Err(_) => warn!("Event consumer did not drain in time"),
        }
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}
