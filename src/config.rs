use std::str::FromStr;
use std::time::Duration;

use crate::domain::entities::ledger_entry::FeeSchedule;
use crate::domain::services::reward_service::RewardServiceConfig;
use crate::persistence::DatabaseConfig;

/// Where the shared cache lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// `cache_entries` table in the durable store, shared by every process
    Sqlite,
    /// Process-local map
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(CacheBackend::Sqlite),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache_backend: CacheBackend,
    pub bind_addr: String,
    pub price_ttl_seconds: u64,
    pub price_refresh_interval_seconds: u64,
    pub tracked_symbols: Vec<String>,
    pub fees: FeeSchedule,
    pub idempotency_ttl_seconds: u64,
    pub store_timeout_milliseconds: u64,
    pub publish_timeout_milliseconds: u64,
    /// Events are POSTed here when set, otherwise handed to the in-process consumer
    pub event_webhook_url: Option<String>,
    pub rate_limit_per_minute: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache_backend: CacheBackend::Sqlite,
            bind_addr: "127.0.0.1:8080".to_string(),
            price_ttl_seconds: 7200,             // 2 hours
            price_refresh_interval_seconds: 3600, // hourly
            tracked_symbols: ["RELIANCE", "TCS", "INFY", "HDFCBANK"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fees: FeeSchedule::default(),
            idempotency_ttl_seconds: 86400,
            store_timeout_milliseconds: 5000,
            publish_timeout_milliseconds: 2000,
            event_webhook_url: None,
            rate_limit_per_minute: 100,
        }
    }
}

/// Parse `name` when present, keeping `current` (with a warning) when it is
/// malformed or rejected by `valid`
fn override_with<T, F>(lookup: &F, name: &str, current: &mut T, valid: impl Fn(&T) -> bool)
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => *current = value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {:?}, using default: {:?}",
                name,
                value,
                current
            );
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {:?}",
                name,
                raw,
                e,
                current
            );
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppConfig {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> AppConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig {
            database: DatabaseConfig::from_lookup(&lookup),
            ..AppConfig::default()
        };

        override_with(&lookup, "CACHE_BACKEND", &mut config.cache_backend, |_| true);

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }

        override_with(&lookup, "PRICE_TTL_SECONDS", &mut config.price_ttl_seconds, |n| {
            *n > 0
        });
        override_with(
            &lookup,
            "PRICE_REFRESH_INTERVAL_SECONDS",
            &mut config.price_refresh_interval_seconds,
            |n| *n > 0,
        );

        if let Some(symbols) = lookup("TRACKED_SYMBOLS") {
            let parsed: Vec<String> = symbols
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if parsed.is_empty() {
                tracing::warn!("TRACKED_SYMBOLS is empty, using default: {:?}", config.tracked_symbols);
            } else {
                config.tracked_symbols = parsed;
            }
        }

        let brokerage = lookup("BROKERAGE_RATE");
        let stt = lookup("STT_RATE");
        if brokerage.is_some() || stt.is_some() {
            let defaults = FeeSchedule::default();
            let brokerage = brokerage.unwrap_or_else(|| defaults.brokerage_rate.to_string());
            let stt = stt.unwrap_or_else(|| defaults.stt_rate.to_string());
            match FeeSchedule::parse(&brokerage, &stt) {
                Ok(fees) => config.fees = fees,
                Err(e) => tracing::warn!("{}, using default fee rates", e),
            }
        }

        override_with(
            &lookup,
            "IDEMPOTENCY_TTL_SECONDS",
            &mut config.idempotency_ttl_seconds,
            |n| *n > 0,
        );
        override_with(
            &lookup,
            "STORE_TIMEOUT_MS",
            &mut config.store_timeout_milliseconds,
            |n| *n > 0,
        );
        override_with(
            &lookup,
            "PUBLISH_TIMEOUT_MS",
            &mut config.publish_timeout_milliseconds,
            |n| *n > 0,
        );

        config.event_webhook_url = lookup("EVENT_WEBHOOK_URL").filter(|url| !url.trim().is_empty());

        override_with(
            &lookup,
            "RATE_LIMIT_PER_MINUTE",
            &mut config.rate_limit_per_minute,
            |n| *n > 0,
        );

        config
    }

    pub fn price_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.price_refresh_interval_seconds)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_milliseconds)
    }

    /// Settings handed to the reward service
    pub fn service_config(&self) -> RewardServiceConfig {
        RewardServiceConfig {
            price_ttl: Duration::from_secs(self.price_ttl_seconds),
            idempotency_ttl: Duration::from_secs(self.idempotency_ttl_seconds),
            fees: self.fees.clone(),
            store_timeout: Duration::from_millis(self.store_timeout_milliseconds),
            publish_timeout: self.publish_timeout(),
        }
    }
}
