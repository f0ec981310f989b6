//! Idempotency Guard
//!
//! Claims a caller-supplied key exactly once through the shared cache's
//! atomic set-if-absent primitive. The first claimant stores a pending
//! placeholder and later replaces it with the outcome; every repeat claim
//! within the TTL gets that outcome back instead of re-executing.
//!
//! The placeholder only lives for `pending_ttl`, which must outlast one
//! admission. A claimant that vanishes without completing or releasing
//! (dropped future, dead process) therefore frees the key on its own.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::{RewardError, StorageError};
use crate::domain::repositories::SharedCache;

pub const IDEMPOTENCY_KEY_PREFIX: &str = "idempotency:";

const CLAIM_ATTEMPTS: usize = 3;

/// Value stored under a claimed key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StoredOutcome {
    /// Claimed, admission still running
    Pending,
    Created { reward_id: String },
    Conflict { existing_id: String },
}

/// Reward id returned to the caller, flagged when served from a stored outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardReceipt {
    pub reward_id: String,
    pub replayed: bool,
}

impl StoredOutcome {
    /// Turn a prior outcome into the response the first caller received
    pub fn replay(self, key: &str) -> Result<RewardReceipt, RewardError> {
        match self {
            StoredOutcome::Pending => Err(RewardError::InProgress {
                key: key.to_string(),
            }),
            StoredOutcome::Created { reward_id } => Ok(RewardReceipt {
                reward_id,
                replayed: true,
            }),
            StoredOutcome::Conflict { existing_id } => Err(RewardError::Conflict { existing_id }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Empty key, idempotency not engaged
    Disengaged,
    /// This caller owns the key and must record an outcome or release it
    Claimed,
    /// Another caller got here first
    Replay(StoredOutcome),
}

pub struct IdempotencyGuard {
    cache: Arc<dyn SharedCache>,
    ttl: Duration,
    pending_ttl: Duration,
}

impl IdempotencyGuard {
    /// `ttl` applies to recorded outcomes, `pending_ttl` to the placeholder
    pub fn new(cache: Arc<dyn SharedCache>, ttl: Duration, pending_ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            pending_ttl: pending_ttl.min(ttl),
        }
    }

    fn cache_key(key: &str) -> String {
        format!("{}{}", IDEMPOTENCY_KEY_PREFIX, key)
    }

    fn encode(outcome: &StoredOutcome) -> Result<String, StorageError> {
        serde_json::to_string(outcome).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    pub async fn claim(&self, key: &str) -> Result<Claim, StorageError> {
        if key.is_empty() {
            return Ok(Claim::Disengaged);
        }

        let cache_key = Self::cache_key(key);
        let placeholder = Self::encode(&StoredOutcome::Pending)?;

        // The prior entry can expire between the failed claim and the read
        for _ in 0..CLAIM_ATTEMPTS {
            if self
                .cache
                .set_if_absent(&cache_key, &placeholder, self.pending_ttl)
                .await?
            {
                debug!("Claimed idempotency key {}", key);
                return Ok(Claim::Claimed);
            }

            if let Some(raw) = self.cache.get(&cache_key).await? {
                let outcome = serde_json::from_str(&raw).map_err(|e| {
                    StorageError::Corrupt(format!("idempotency record {}: {}", key, e))
                })?;
                debug!("Idempotency key {} already claimed: {:?}", key, outcome);
                return Ok(Claim::Replay(outcome));
            }
        }

        Err(StorageError::Cache(format!(
            "idempotency key {} kept changing hands",
            key
        )))
    }

    /// Replace the placeholder with the final outcome, kept for the full TTL
    pub async fn complete(&self, key: &str, outcome: &StoredOutcome) -> Result<(), StorageError> {
        let value = Self::encode(outcome)?;
        self.cache.set(&Self::cache_key(key), &value, self.ttl).await
    }

    /// Give the key back so a retry can run
    pub async fn release(&self, key: &str) {
        if let Err(e) = self.cache.delete(&Self::cache_key(key)).await {
            warn!("Failed to release idempotency key {}: {}", key, e);
        }
    }
}
