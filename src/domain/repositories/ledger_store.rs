//! Durable Store Trait
//!
//! Everything the core needs from the relational store: the reward/ledger
//! tables and the price history. Implemented by the SQLite repository and
//! substituted by fakes in tests.

use async_trait::async_trait;

use crate::domain::entities::ledger_entry::LedgerEntry;
use crate::domain::entities::price_quote::PriceQuote;
use crate::domain::entities::reward::Reward;
use crate::domain::errors::StorageError;

pub type StoreResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Id of a reward already holding `unique_hash` or the (non-empty) idempotency key
    async fn find_existing_reward(
        &self,
        unique_hash: &str,
        idempotency_key: Option<&str>,
    ) -> StoreResult<Option<String>>;

    /// Write the reward and its ledger entries as one atomic unit.
    ///
    /// Returns `StorageError::UniqueViolation` when the hash or key is taken;
    /// in every failure case none of the rows are visible afterwards.
    async fn insert_reward_with_entries(
        &self,
        reward: &Reward,
        entries: &[LedgerEntry],
    ) -> StoreResult<()>;

    async fn get_reward(&self, id: &str) -> StoreResult<Option<Reward>>;

    /// All rewards of a user ordered by `rewarded_at`
    async fn list_rewards_for_user(&self, user_id: &str) -> StoreResult<Vec<Reward>>;

    async fn ledger_entries_for_reward(&self, reward_id: &str) -> StoreResult<Vec<LedgerEntry>>;

    /// Persist a quote. The latest-price row only moves forward in time;
    /// returns false when a newer quote was already recorded.
    async fn record_price(&self, quote: &PriceQuote, source: &str) -> StoreResult<bool>;

    async fn latest_price(&self, symbol: &str) -> StoreResult<Option<PriceQuote>>;
}
