use thiserror::Error;

/// Input rejected before anything was written
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid shares '{0}': not a valid decimal")]
    InvalidShares(String),

    #[error("Shares must be positive, got {0}")]
    NonPositiveShares(String),

    #[error("Invalid rewarded_at '{0}': expected an RFC3339 timestamp")]
    InvalidTimestamp(String),

    #[error("Invalid rate '{0}': must be a non-negative decimal")]
    InvalidRate(String),
}

/// Failure of the durable store or the shared cache
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    #[error("Deadline exceeded during {0}")]
    Timeout(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::UniqueViolation(db.message().to_string())
            }
            _ => StorageError::Database(e.to_string()),
        }
    }
}

/// Event delivery failure. Logged by the caller, never propagated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Event channel is full")]
    ChannelFull,

    #[error("Event channel is closed")]
    ChannelClosed,

    #[error("Publish timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Outcome taxonomy of the reward operations.
///
/// `Validation` means nothing happened, `Conflict` means it already happened,
/// `Storage` means the state is unknown and must be investigated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RewardError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Duplicate reward, existing id {existing_id}")]
    Conflict { existing_id: String },

    #[error("Request with idempotency key '{key}' is still being processed")]
    InProgress { key: String },

    #[error("No price available for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl RewardError {
    /// Short error code for logging and API bodies
    pub fn code(&self) -> &'static str {
        match self {
            RewardError::Validation(_) => "VALIDATION",
            RewardError::Conflict { .. } => "CONFLICT",
            RewardError::InProgress { .. } => "IN_PROGRESS",
            RewardError::PriceUnavailable { .. } => "PRICE_UNAVAILABLE",
            RewardError::Storage(_) => "STORAGE",
        }
    }
}
