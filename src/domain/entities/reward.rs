//! Reward entity - a credited quantity of a stock granted to a user
//!
//! Rewards are append-only: created once by the ledger writer and never
//! mutated afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::Shares;

/// Lifecycle status of a reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardStatus {
    Active,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardStatus::Active => "active",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(RewardStatus::Active),
            _ => None,
        }
    }
}

/// A committed reward row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub user_id: String,
    pub stock_symbol: String,
    pub shares: Shares,
    /// Business-effective time of the grant
    pub rewarded_at: DateTime<Utc>,
    /// Ingestion time
    pub created_at: DateTime<Utc>,
    pub unique_hash: String,
    pub idempotency_key: Option<String>,
    pub status: RewardStatus,
}

impl Reward {
    /// UTC calendar date the reward is effective on
    pub fn reward_date(&self) -> NaiveDate {
        self.rewarded_at.date_naive()
    }
}

/// Raw admission request as received from the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRewardRequest {
    pub stock_symbol: String,
    pub shares: String,
    pub rewarded_at: String,
}

/// A validated admission, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewReward {
    pub user_id: String,
    pub stock_symbol: String,
    pub shares: Shares,
    pub rewarded_at: DateTime<Utc>,
    pub unique_hash: String,
    pub idempotency_key: Option<String>,
}

impl NewReward {
    /// Validate a raw request. Malformed values are rejected, never defaulted.
    pub fn validate(
        user_id: &str,
        request: &CreateRewardRequest,
        idempotency_key: &str,
    ) -> Result<Self, ValidationError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::MissingField("user_id"));
        }
        let symbol = request.stock_symbol.trim();
        if symbol.is_empty() {
            return Err(ValidationError::MissingField("stock_symbol"));
        }
        if request.rewarded_at.trim().is_empty() {
            return Err(ValidationError::MissingField("rewarded_at"));
        }

        let shares = Shares::parse(&request.shares)?;
        let rewarded_at = DateTime::parse_from_rfc3339(&request.rewarded_at)
            .map_err(|_| ValidationError::InvalidTimestamp(request.rewarded_at.clone()))?
            .with_timezone(&Utc);

        let idempotency_key = match idempotency_key.trim() {
            "" => None,
            key => Some(key.to_string()),
        };

        Ok(NewReward {
            user_id: user_id.to_string(),
            stock_symbol: symbol.to_string(),
            shares,
            rewarded_at,
            unique_hash: unique_hash(user_id, symbol, &request.shares, &request.rewarded_at),
            idempotency_key,
        })
    }

    pub fn into_reward(self, id: String, created_at: DateTime<Utc>) -> Reward {
        Reward {
            id,
            user_id: self.user_id,
            stock_symbol: self.stock_symbol,
            shares: self.shares,
            rewarded_at: self.rewarded_at,
            created_at,
            unique_hash: self.unique_hash,
            idempotency_key: self.idempotency_key,
            status: RewardStatus::Active,
        }
    }
}

/// Content digest used for dedup: hex SHA-256 over the business fields as submitted
pub fn unique_hash(user_id: &str, symbol: &str, shares: &str, rewarded_at: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(symbol.as_bytes());
    hasher.update(shares.as_bytes());
    hasher.update(rewarded_at.as_bytes());
    hex::encode(hasher.finalize())
}
