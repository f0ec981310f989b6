//! Ledger Writer
//!
//! Admits a validated reward: dedup by content hash, value it against the
//! price cache, write the reward and its three ledger entries in one
//! transaction. Announcing the committed reward is a separate step so the
//! caller can record the outcome first and keep the publish out of any
//! store deadline.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::price_cache::PriceCache;
use crate::domain::entities::ledger_entry::{FeeSchedule, LedgerEntry};
use crate::domain::entities::reward::{NewReward, Reward};
use crate::domain::entities::reward_event::RewardCreatedEvent;
use crate::domain::errors::{PublishError, RewardError, StorageError};
use crate::domain::repositories::{EventPublisher, LedgerStore};

pub struct LedgerWriter {
    store: Arc<dyn LedgerStore>,
    prices: Arc<PriceCache>,
    publisher: Arc<dyn EventPublisher>,
    fees: FeeSchedule,
    publish_timeout: Duration,
}

impl LedgerWriter {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        prices: Arc<PriceCache>,
        publisher: Arc<dyn EventPublisher>,
        fees: FeeSchedule,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            store,
            prices,
            publisher,
            fees,
            publish_timeout,
        }
    }

    /// Dedup, price and commit. Nothing is published here.
    pub async fn admit(&self, new_reward: NewReward) -> Result<Reward, RewardError> {
        if let Some(existing_id) = self
            .store
            .find_existing_reward(&new_reward.unique_hash, new_reward.idempotency_key.as_deref())
            .await?
        {
            debug!("Reward {} already recorded", existing_id);
            return Err(RewardError::Conflict { existing_id });
        }

        // Priced before the transaction opens: the cache may share the
        // database and must not queue behind our own write lock
        let quote = self.prices.get_price(&new_reward.stock_symbol).await?;

        let now = Utc::now();
        let reward = new_reward.into_reward(Uuid::new_v4().to_string(), now);
        let entries = LedgerEntry::for_reward(&reward, &quote.price, &self.fees, now);

        match self.store.insert_reward_with_entries(&reward, &entries).await {
            Ok(()) => {}
            Err(StorageError::UniqueViolation(detail)) => {
                // Lost the race against an identical admission
                let existing = self
                    .store
                    .find_existing_reward(&reward.unique_hash, reward.idempotency_key.as_deref())
                    .await?;
                return Err(match existing {
                    Some(existing_id) => RewardError::Conflict { existing_id },
                    None => RewardError::Storage(StorageError::UniqueViolation(detail)),
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            "Recorded reward {} for {}: {} {} at {}",
            reward.id, reward.user_id, reward.shares, reward.stock_symbol, quote.price
        );

        Ok(reward)
    }

    /// Publish `RewardCreated` for a committed reward. Failures are logged only.
    pub async fn announce(&self, reward: &Reward) {
        if let Err(e) = self.publish(reward).await {
            warn!(
                "Reward {} committed but {} publish failed: {}",
                reward.id,
                self.publisher.name(),
                e
            );
        }
    }

    /// Bounded, single-attempt publish of the `RewardCreated` event
    pub async fn publish(&self, reward: &Reward) -> Result<(), PublishError> {
        let envelope = RewardCreatedEvent::from_reward(reward).to_envelope()?;
        tokio::time::timeout(self.publish_timeout, self.publisher.publish(&envelope))
            .await
            .map_err(|_| PublishError::Timeout(self.publish_timeout))?
    }
}
