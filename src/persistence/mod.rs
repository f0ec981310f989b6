//! Persistence Layer
//!
//! SQLite storage for rewards, ledger entries, price history and the shared
//! cache, with async operations via sqlx.
//!
//! # Database Schema
//!
//! ## reward
//! - id: UUID
//! - user_id, stock_symbol
//! - shares: exact decimal as TEXT
//! - rewarded_at / created_at: timestamps
//! - unique_hash: UNIQUE content digest
//! - idempotency_key: UNIQUE, NULL when the caller supplied none
//! - status: "active"
//!
//! ## ledger_entries
//! - reward_id: foreign key to reward
//! - event_type: "reward" or "fee"
//! - fee_type: "", "brokerage" or "STT"
//! - shares, inr_amount, unit_price: exact decimals as TEXT
//!
//! ## stock_prices
//! - symbol: PRIMARY KEY, latest quote only
//! - updated_at: epoch milliseconds, only ever moves forward
//!
//! ## stock_price_history
//! - append-only audit of every persisted quote
//!
//! ## cache_entries
//! - key/value rows with version and expiry backing the shared cache

pub mod cache_repository;
pub mod ledger_repository;
pub mod models;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

/// Initialize a pool with the default pool settings
///
/// # Arguments
/// - `database_url`: SQLite URL (e.g., "sqlite://data/rewards.db" or "sqlite::memory:")
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    init_database_with_config(&DatabaseConfig {
        url: database_url.to_string(),
        ..DatabaseConfig::default()
    })
    .await
}

/// Initialize the database connection pool and run migrations
///
/// # Errors
/// Returns error if the connection fails or a migration fails
pub async fn init_database_with_config(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let mut options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

    // WAL lets readers proceed while another process holds the write lock
    if !config.url.contains(":memory:") {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reward (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            stock_symbol TEXT NOT NULL,
            shares TEXT NOT NULL,
            rewarded_at DATETIME NOT NULL,
            created_at DATETIME NOT NULL,
            unique_hash TEXT NOT NULL UNIQUE,
            idempotency_key TEXT UNIQUE,
            status TEXT NOT NULL CHECK(status IN ('active'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create reward table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reward_id TEXT NOT NULL,
            event_type TEXT NOT NULL CHECK(event_type IN ('reward', 'fee')),
            user_id TEXT NOT NULL,
            stock_symbol TEXT NOT NULL,
            shares TEXT NOT NULL,
            inr_amount TEXT NOT NULL,
            fee_type TEXT NOT NULL DEFAULT '' CHECK(fee_type IN ('', 'brokerage', 'STT')),
            unit_price TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (reward_id) REFERENCES reward(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create ledger_entries table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stock_prices (
            symbol TEXT PRIMARY KEY,
            price TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create stock_prices table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stock_price_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            price TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            source TEXT NOT NULL,
            recorded_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!(
            "Failed to create stock_price_history table: {}",
            e
        ))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create cache_entries table: {}", e))
    })?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reward_user ON reward(user_id)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ledger_reward ON ledger_entries(reward_id)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_price_history_symbol ON stock_price_history(symbol, updated_at)",
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/rewards.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// How long a connection waits for another writer's lock
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/rewards.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source, keeping defaults for bad values
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let url = lookup("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(
                        "Invalid DATABASE_MAX_CONNECTIONS '{}', using default: {}",
                        raw, defaults.max_connections
                    );
                    defaults.max_connections
                }
            },
            None => defaults.max_connections,
        };

        let busy_timeout = lookup("DATABASE_BUSY_TIMEOUT_MS")
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.busy_timeout);

        Self {
            url,
            max_connections,
            busy_timeout,
        }
    }
}
