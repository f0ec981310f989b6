//! Downstream notification emitted after a reward commits

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::reward::Reward;
use crate::domain::errors::PublishError;

pub const REWARD_EVENTS_TOPIC: &str = "reward-events";
pub const CORRELATION_ID_HEADER: &str = "correlation_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardCreatedEvent {
    pub reward_id: String,
    pub user_id: String,
    pub stock_symbol: String,
    pub shares: String,
    pub rewarded_at: String,
    /// Idempotency key of the admission, empty when none was supplied
    pub correlation_id: String,
}

impl RewardCreatedEvent {
    pub fn from_reward(reward: &Reward) -> Self {
        Self {
            reward_id: reward.id.clone(),
            user_id: reward.user_id.clone(),
            stock_symbol: reward.stock_symbol.clone(),
            shares: reward.shares.to_string(),
            rewarded_at: reward.rewarded_at.to_rfc3339(),
            correlation_id: reward.idempotency_key.clone().unwrap_or_default(),
        }
    }

    /// Wrap into a transport envelope. Keyed by user so per-user order survives partitioning.
    pub fn to_envelope(&self) -> Result<EventEnvelope, PublishError> {
        let payload =
            serde_json::to_string(self).map_err(|e| PublishError::Serialization(e.to_string()))?;
        let mut headers = BTreeMap::new();
        headers.insert(CORRELATION_ID_HEADER.to_string(), self.correlation_id.clone());
        Ok(EventEnvelope {
            topic: REWARD_EVENTS_TOPIC.to_string(),
            key: self.user_id.clone(),
            payload,
            headers,
        })
    }
}

/// Transport-neutral message handed to an `EventPublisher`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: String,
    pub key: String,
    /// JSON body
    pub payload: String,
    pub headers: BTreeMap<String, String>,
}

impl EventEnvelope {
    pub fn correlation_id(&self) -> &str {
        self.headers
            .get(CORRELATION_ID_HEADER)
            .map(String::as_str)
            .unwrap_or("")
    }
}
