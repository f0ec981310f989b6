//! Reward Service
//!
//! Entry point used by the API layer. Holds the guard, writer and aggregator
//! explicitly; there is no process-wide state. Store work runs under a
//! deadline, and dropping the in-flight future rolls back any open
//! transaction. The event for a committed reward is published after its
//! outcome is recorded, outside that deadline.

use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::idempotency_guard::{Claim, IdempotencyGuard, RewardReceipt, StoredOutcome};
use super::ledger_writer::LedgerWriter;
use super::price_cache::{PriceCache, DEFAULT_PRICE_TTL};
use super::valuation::ValuationAggregator;
use crate::domain::entities::ledger_entry::FeeSchedule;
use crate::domain::entities::reward::{CreateRewardRequest, NewReward, Reward};
use crate::domain::entities::valuation::{HistoricalInr, Pagination, Portfolio, Stats, StatsScope};
use crate::domain::errors::{RewardError, StorageError};
use crate::domain::repositories::{EventPublisher, LedgerStore, QuoteSource, SharedCache};

/// Slack on top of the store deadline before an abandoned claim frees its key
const PENDING_GRACE: Duration = Duration::from_millis(500);

/// Tunables of the reward core
#[derive(Debug, Clone)]
pub struct RewardServiceConfig {
    pub price_ttl: Duration,
    pub idempotency_ttl: Duration,
    pub fees: FeeSchedule,
    pub store_timeout: Duration,
    pub publish_timeout: Duration,
}

impl Default for RewardServiceConfig {
    fn default() -> Self {
        Self {
            price_ttl: DEFAULT_PRICE_TTL,
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
            fees: FeeSchedule::default(),
            store_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(2),
        }
    }
}

pub struct RewardService {
    store: Arc<dyn LedgerStore>,
    guard: IdempotencyGuard,
    writer: LedgerWriter,
    aggregator: ValuationAggregator,
    prices: Arc<PriceCache>,
    store_timeout: Duration,
}

impl RewardService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn SharedCache>,
        source: Arc<dyn QuoteSource>,
        publisher: Arc<dyn EventPublisher>,
        config: RewardServiceConfig,
    ) -> Self {
        let prices = Arc::new(PriceCache::new(
            cache.clone(),
            source,
            store.clone(),
            config.price_ttl,
        ));

        Self {
            guard: IdempotencyGuard::new(
                cache,
                config.idempotency_ttl,
                config.store_timeout + PENDING_GRACE,
            ),
            writer: LedgerWriter::new(
                store.clone(),
                prices.clone(),
                publisher,
                config.fees,
                config.publish_timeout,
            ),
            aggregator: ValuationAggregator::new(store.clone(), prices.clone()),
            store,
            prices,
            store_timeout: config.store_timeout,
        }
    }

    /// Price cache shared with the background refresher
    pub fn price_cache(&self) -> Arc<PriceCache> {
        self.prices.clone()
    }

    async fn with_deadline<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, RewardError>>,
    ) -> Result<T, RewardError> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| {
                warn!("{} exceeded {:?}", operation, self.store_timeout);
                RewardError::Storage(StorageError::Timeout(operation.to_string()))
            })?
    }

    /// Admit a reward exactly once.
    ///
    /// Malformed input is rejected before the idempotency key is claimed, so
    /// a corrected retry may reuse the key.
    pub async fn create_reward(
        &self,
        user_id: &str,
        request: &CreateRewardRequest,
        idempotency_key: &str,
    ) -> Result<RewardReceipt, RewardError> {
        let new_reward = NewReward::validate(user_id, request, idempotency_key)?;
        let key = new_reward.idempotency_key.clone().unwrap_or_default();

        let claimed = match self.guard.claim(&key).await? {
            Claim::Replay(outcome) => {
                debug!("Replaying stored outcome for key {}", key);
                return outcome.replay(&key);
            }
            Claim::Disengaged => false,
            Claim::Claimed => true,
        };

        let admitted = self
            .with_deadline("create_reward", self.writer.admit(new_reward))
            .await;

        let outcome = match &admitted {
            Ok(reward) => Some(StoredOutcome::Created {
                reward_id: reward.id.clone(),
            }),
            Err(RewardError::Conflict { existing_id }) => {
                Some(self.conflict_outcome(&key, existing_id).await)
            }
            Err(_) => None,
        };

        if claimed {
            match &outcome {
                Some(outcome) => {
                    if let Err(e) = self.guard.complete(&key, outcome).await {
                        // The content hash still guards a retry
                        warn!("Failed to store outcome for key {}: {}", key, e);
                    }
                }
                None => self.guard.release(&key).await,
            }
        }

        match admitted {
            Ok(reward) => {
                self.writer.announce(&reward).await;
                Ok(RewardReceipt {
                    reward_id: reward.id,
                    replayed: false,
                })
            }
            Err(e) => match outcome {
                Some(created @ StoredOutcome::Created { .. }) => created.replay(&key),
                _ => Err(e),
            },
        }
    }

    /// A conflict with a reward committed under this very key is an earlier
    /// attempt of the same request whose answer was lost, so it replays as
    /// created.
    async fn conflict_outcome(&self, key: &str, existing_id: &str) -> StoredOutcome {
        if !key.is_empty() {
            match self.store.get_reward(existing_id).await {
                Ok(Some(existing)) if existing.idempotency_key.as_deref() == Some(key) => {
                    debug!("Key {} already committed as reward {}", key, existing_id);
                    return StoredOutcome::Created {
                        reward_id: existing_id.to_string(),
                    };
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to load conflicting reward {}: {}", existing_id, e),
            }
        }
        StoredOutcome::Conflict {
            existing_id: existing_id.to_string(),
        }
    }

    pub async fn list_rewards_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Reward>, RewardError> {
        self.with_deadline(
            "list_rewards_for_date",
            self.aggregator.rewards_for_date(user_id, date),
        )
        .await
    }

    pub async fn get_historical_inr(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        page: Option<Pagination>,
    ) -> Result<Vec<HistoricalInr>, RewardError> {
        self.with_deadline(
            "get_historical_inr",
            self.aggregator.historical_inr(user_id, from, to, page),
        )
        .await
    }

    pub async fn get_stats(&self, user_id: &str, scope: StatsScope) -> Result<Stats, RewardError> {
        self.with_deadline("get_stats", self.aggregator.stats(user_id, scope))
            .await
    }

    pub async fn get_portfolio(&self, user_id: &str) -> Result<Portfolio, RewardError> {
        self.with_deadline("get_portfolio", self.aggregator.portfolio(user_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ledger_entry::LedgerEntry;
    use crate::domain::entities::price_quote::PriceQuote;
    use crate::domain::entities::reward_event::EventEnvelope;
    use crate::domain::errors::{PublishError, ValidationError};
    use crate::domain::repositories::StoreResult;
    use crate::domain::services::test_support::{
        memory_store, request, FixedQuoteSource, RecordingPublisher,
    };
    use crate::infrastructure::memory_cache::InMemoryCache;
    use crate::persistence::ledger_repository::SqliteLedgerStore;
    use async_trait::async_trait;

    struct SlowPublisher;

    #[async_trait]
    impl EventPublisher for SlowPublisher {
        fn name(&self) -> &str {
            "slow"
        }

        async fn publish(&self, _envelope: &EventEnvelope) -> Result<(), PublishError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    /// Store whose atomic insert only starts after a delay
    struct SlowInsertStore {
        inner: Arc<SqliteLedgerStore>,
        delay: Duration,
    }

    #[async_trait]
    impl LedgerStore for SlowInsertStore {
        async fn find_existing_reward(
            &self,
            unique_hash: &str,
            idempotency_key: Option<&str>,
        ) -> StoreResult<Option<String>> {
            self.inner.find_existing_reward(unique_hash, idempotency_key).await
        }

        async fn insert_reward_with_entries(
            &self,
            reward: &Reward,
            entries: &[LedgerEntry],
        ) -> StoreResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.insert_reward_with_entries(reward, entries).await
        }

        async fn get_reward(&self, id: &str) -> StoreResult<Option<Reward>> {
            self.inner.get_reward(id).await
        }

        async fn list_rewards_for_user(&self, user_id: &str) -> StoreResult<Vec<Reward>> {
            self.inner.list_rewards_for_user(user_id).await
        }

        async fn ledger_entries_for_reward(&self, reward_id: &str) -> StoreResult<Vec<LedgerEntry>> {
            self.inner.ledger_entries_for_reward(reward_id).await
        }

        async fn record_price(&self, quote: &PriceQuote, source: &str) -> StoreResult<bool> {
            self.inner.record_price(quote, source).await
        }

        async fn latest_price(&self, symbol: &str) -> StoreResult<Option<PriceQuote>> {
            self.inner.latest_price(symbol).await
        }
    }

    async fn service_with(
        store: Arc<dyn LedgerStore>,
        publisher: Arc<dyn EventPublisher>,
        config: RewardServiceConfig,
    ) -> (Arc<RewardService>, Arc<FixedQuoteSource>) {
        let source = Arc::new(FixedQuoteSource::new("2500"));
        let service = RewardService::new(
            store,
            Arc::new(InMemoryCache::new()),
            source.clone(),
            publisher,
            config,
        );
        (Arc::new(service), source)
    }

    struct Fixture {
        service: RewardService,
        source: Arc<FixedQuoteSource>,
        publisher: Arc<RecordingPublisher>,
    }

    async fn fixture() -> Fixture {
        let source = Arc::new(FixedQuoteSource::new("2500"));
        let publisher = Arc::new(RecordingPublisher::default());
        let service = RewardService::new(
            memory_store().await,
            Arc::new(InMemoryCache::new()),
            source.clone(),
            publisher.clone(),
            RewardServiceConfig::default(),
        );
        Fixture {
            service,
            source,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_identical_content_conflicts_with_first_id() {
        let f = fixture().await;
        let req = request("RELIANCE", "1.000000", "2025-09-25T11:30:00Z");

        let first = f.service.create_reward("u1", &req, "").await.unwrap();
        assert!(!first.replayed);

        let err = f.service.create_reward("u1", &req, "").await.unwrap_err();
        assert_eq!(
            err,
            RewardError::Conflict {
                existing_id: first.reward_id
            }
        );
    }

    #[tokio::test]
    async fn test_same_key_different_body_replays_first_result() {
        let f = fixture().await;
        let first = f
            .service
            .create_reward(
                "u1",
                &request("RELIANCE", "1", "2025-09-25T11:30:00Z"),
                "key-1",
            )
            .await
            .unwrap();

        let second = f
            .service
            .create_reward("u1", &request("TCS", "5", "2025-09-26T11:30:00Z"), "key-1")
            .await
            .unwrap();

        assert_eq!(second.reward_id, first.reward_id);
        assert!(second.replayed);
        assert_eq!(f.publisher.published().len(), 1);
        assert_eq!(
            f.service.get_portfolio("u1").await.unwrap().holdings.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_conflict_outcome_is_replayed_under_new_key() {
        let f = fixture().await;
        let req = request("INFY", "2", "2025-09-25T11:30:00Z");
        let first = f.service.create_reward("u1", &req, "").await.unwrap();

        for _ in 0..2 {
            let err = f.service.create_reward("u1", &req, "key-2").await.unwrap_err();
            assert_eq!(
                err,
                RewardError::Conflict {
                    existing_id: first.reward_id.clone()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_validation_does_not_consume_key() {
        let f = fixture().await;
        let err = f
            .service
            .create_reward("u1", &request("TCS", "abc", "2025-09-25T11:30:00Z"), "key-3")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RewardError::Validation(ValidationError::InvalidShares("abc".to_string()))
        );

        let fixed = f
            .service
            .create_reward("u1", &request("TCS", "1", "2025-09-25T11:30:00Z"), "key-3")
            .await
            .unwrap();
        assert!(!fixed.replayed);
    }

    #[tokio::test]
    async fn test_failed_admission_releases_key() {
        let f = fixture().await;
        f.source.set_failing(true);
        let req = request("TCS", "1", "2025-09-25T11:30:00Z");

        let err = f.service.create_reward("u1", &req, "key-4").await.unwrap_err();
        assert_eq!(err.code(), "PRICE_UNAVAILABLE");

        f.source.set_failing(false);
        let receipt = f.service.create_reward("u1", &req, "key-4").await.unwrap();
        assert!(!receipt.replayed);
    }

    #[tokio::test]
    async fn test_in_flight_key_reports_in_progress() {
        let f = fixture().await;
        assert_eq!(f.service.guard.claim("key-5").await.unwrap(), Claim::Claimed);

        let err = f
            .service
            .create_reward("u1", &request("TCS", "1", "2025-09-25T11:30:00Z"), "key-5")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RewardError::InProgress {
                key: "key-5".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_reads_go_through_facade() {
        let f = fixture().await;
        f.service
            .create_reward("u1", &request("TCS", "2", "2025-09-25T11:30:00Z"), "")
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 9, 25).unwrap();
        assert_eq!(
            f.service.list_rewards_for_date("u1", date).await.unwrap().len(),
            1
        );
        assert_eq!(
            f.service
                .get_historical_inr("u1", None, None, None)
                .await
                .unwrap()
                .len(),
            1
        );
        let stats = f.service.get_stats("u1", StatsScope::AllTime).await.unwrap();
        assert_eq!(stats.portfolio_value_inr, bigdecimal::BigDecimal::from(5000));
    }

    #[tokio::test]
    async fn test_slow_publish_keeps_committed_success() {
        let store = memory_store().await;
        let config = RewardServiceConfig {
            store_timeout: Duration::from_millis(300),
            publish_timeout: Duration::from_millis(600),
            ..RewardServiceConfig::default()
        };
        let (service, _source) = service_with(store.clone(), Arc::new(SlowPublisher), config).await;
        let req = request("TCS", "1", "2025-09-25T11:30:00Z");

        let receipt = service.create_reward("u1", &req, "key-p").await.unwrap();
        assert!(!receipt.replayed);
        assert_eq!(store.list_rewards_for_user("u1").await.unwrap().len(), 1);

        let retry = service.create_reward("u1", &req, "key-p").await.unwrap();
        assert_eq!(retry.reward_id, receipt.reward_id);
        assert!(retry.replayed);
    }

    #[tokio::test]
    async fn test_deadline_while_pricing_writes_nothing_and_frees_key() {
        let store = memory_store().await;
        let config = RewardServiceConfig {
            store_timeout: Duration::from_millis(100),
            ..RewardServiceConfig::default()
        };
        let (service, source) = service_with(
            store.clone(),
            Arc::new(RecordingPublisher::default()),
            config,
        )
        .await;
        source.set_delay(Duration::from_millis(400));
        let req = request("TCS", "1", "2025-09-25T11:30:00Z");

        let err = service.create_reward("u1", &req, "key-t").await.unwrap_err();
        assert_eq!(
            err,
            RewardError::Storage(StorageError::Timeout("create_reward".to_string()))
        );
        assert!(store.list_rewards_for_user("u1").await.unwrap().is_empty());

        source.set_delay(Duration::ZERO);
        let receipt = service.create_reward("u1", &req, "key-t").await.unwrap();
        assert!(!receipt.replayed);
        assert_eq!(
            store.ledger_entries_for_reward(&receipt.reward_id).await.unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_deadline_before_insert_leaves_no_rows() {
        let inner = memory_store().await;
        let store = Arc::new(SlowInsertStore {
            inner: inner.clone(),
            delay: Duration::from_millis(400),
        });
        let config = RewardServiceConfig {
            store_timeout: Duration::from_millis(100),
            ..RewardServiceConfig::default()
        };
        let (service, _source) =
            service_with(store, Arc::new(RecordingPublisher::default()), config).await;

        let err = service
            .create_reward("u1", &request("INFY", "2", "2025-09-25T11:30:00Z"), "key-i")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE");

        // Let the abandoned sleep elapse; nothing may land afterwards
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(inner.list_rewards_for_user("u1").await.unwrap().is_empty());
        assert_eq!(
            service.guard.claim("key-i").await.unwrap(),
            Claim::Claimed
        );
    }

    #[tokio::test]
    async fn test_aborted_admission_frees_key_after_pending_window() {
        let store = memory_store().await;
        let config = RewardServiceConfig {
            store_timeout: Duration::from_millis(200),
            ..RewardServiceConfig::default()
        };
        let (service, source) = service_with(
            store.clone(),
            Arc::new(RecordingPublisher::default()),
            config,
        )
        .await;
        source.set_delay(Duration::from_millis(150));
        let req = request("TCS", "1", "2025-09-25T11:30:00Z");

        let handle = {
            let service = service.clone();
            let req = req.clone();
            tokio::spawn(async move { service.create_reward("u1", &req, "key-a").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(store.list_rewards_for_user("u1").await.unwrap().is_empty());

        // Still inside the pending window of the abandoned claim
        assert_eq!(
            service.create_reward("u1", &req, "key-a").await.unwrap_err(),
            RewardError::InProgress {
                key: "key-a".to_string()
            }
        );

        tokio::time::sleep(Duration::from_millis(800)).await;
        source.set_delay(Duration::ZERO);
        let receipt = service.create_reward("u1", &req, "key-a").await.unwrap();
        assert!(!receipt.replayed);
        assert_eq!(store.list_rewards_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_outcome_replays_reward_committed_under_same_key() {
        let f = fixture().await;
        let req = request("HDFCBANK", "1", "2025-09-25T11:30:00Z");
        let first = f.service.create_reward("u1", &req, "key-l").await.unwrap();

        // Outcome record gone, reward row still there
        f.service.guard.release("key-l").await;

        let retry = f.service.create_reward("u1", &req, "key-l").await.unwrap();
        assert_eq!(retry.reward_id, first.reward_id);
        assert!(retry.replayed);
        assert_eq!(f.publisher.published().len(), 1);
    }
}
