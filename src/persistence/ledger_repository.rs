//! Ledger Repository
//!
//! SQLite implementation of [`LedgerStore`]: rewards, their ledger entries,
//! and the durable price tables.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use super::models::{LedgerEntryRecord, RewardRecord, StockPriceRecord};
use super::DbPool;
use crate::domain::entities::ledger_entry::LedgerEntry;
use crate::domain::entities::price_quote::PriceQuote;
use crate::domain::entities::reward::Reward;
use crate::domain::errors::StorageError;
use crate::domain::repositories::{LedgerStore, StoreResult};

pub struct SqliteLedgerStore {
    pool: DbPool,
}

impl SqliteLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Quotes recorded for `symbol`, oldest first
    pub async fn price_history(&self, symbol: &str) -> StoreResult<Vec<PriceQuote>> {
        let records = sqlx::query_as::<_, StockPriceRecord>(
            r#"
            SELECT symbol, price, updated_at FROM stock_price_history
            WHERE symbol = ?1
            ORDER BY updated_at ASC, id ASC
            "#,
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(PriceQuote::try_from).collect()
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn find_existing_reward(
        &self,
        unique_hash: &str,
        idempotency_key: Option<&str>,
    ) -> StoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM reward
            WHERE unique_hash = ?1 OR (?2 IS NOT NULL AND idempotency_key = ?2)
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(unique_hash)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn insert_reward_with_entries(
        &self,
        reward: &Reward,
        entries: &[LedgerEntry],
    ) -> StoreResult<()> {
        // Dropping `tx` on any early return rolls everything back
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO reward (
                id, user_id, stock_symbol, shares, rewarded_at, created_at,
                unique_hash, idempotency_key, status
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&reward.id)
        .bind(&reward.user_id)
        .bind(&reward.stock_symbol)
        .bind(reward.shares.to_string())
        .bind(reward.rewarded_at)
        .bind(reward.created_at)
        .bind(&reward.unique_hash)
        .bind(reward.idempotency_key.as_deref())
        .bind(reward.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let err = StorageError::from(e);
            if matches!(err, StorageError::UniqueViolation(_)) {
                debug!("Reward {} collides with an existing row: {}", reward.id, err);
            } else {
                error!("Failed to insert reward {}: {}", reward.id, err);
            }
            err
        })?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (
                    reward_id, event_type, user_id, stock_symbol, shares,
                    inr_amount, fee_type, unit_price, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&entry.reward_id)
            .bind(entry.event_type.as_str())
            .bind(&entry.user_id)
            .bind(&entry.stock_symbol)
            .bind(entry.shares.to_string())
            .bind(entry.inr_amount.to_string())
            .bind(entry.fee_type.as_str())
            .bind(entry.unit_price.to_string())
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to insert ledger entry for {}: {}", entry.reward_id, e);
                StorageError::from(e)
            })?;
        }

        tx.commit().await?;

        debug!(
            "Committed reward {} with {} ledger entries",
            reward.id,
            entries.len()
        );
        Ok(())
    }

    async fn get_reward(&self, id: &str) -> StoreResult<Option<Reward>> {
        let record = sqlx::query_as::<_, RewardRecord>("SELECT * FROM reward WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(Reward::try_from).transpose()
    }

    async fn list_rewards_for_user(&self, user_id: &str) -> StoreResult<Vec<Reward>> {
        let records = sqlx::query_as::<_, RewardRecord>(
            "SELECT * FROM reward WHERE user_id = ?1 ORDER BY rewarded_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut rewards = records
            .into_iter()
            .map(Reward::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        // Stored text timestamps do not sort chronologically across precisions
        rewards.sort_by(|a, b| {
            a.rewarded_at
                .cmp(&b.rewarded_at)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(rewards)
    }

    async fn ledger_entries_for_reward(&self, reward_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        let records = sqlx::query_as::<_, LedgerEntryRecord>(
            "SELECT * FROM ledger_entries WHERE reward_id = ?1 ORDER BY id ASC",
        )
        .bind(reward_id)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(LedgerEntry::try_from).collect()
    }

    async fn record_price(&self, quote: &PriceQuote, source: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let advanced = sqlx::query(
            r#"
            INSERT INTO stock_prices (symbol, price, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(symbol) DO UPDATE SET
                price = excluded.price,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at > stock_prices.updated_at
            "#,
        )
        .bind(&quote.symbol)
        .bind(quote.price.to_string())
        .bind(quote.version())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        sqlx::query(
            r#"
            INSERT INTO stock_price_history (symbol, price, updated_at, source, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&quote.symbol)
        .bind(quote.price.to_string())
        .bind(quote.version())
        .bind(source)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Recorded {} price {} from {} (latest: {})",
            quote.symbol, quote.price, source, advanced
        );
        Ok(advanced)
    }

    async fn latest_price(&self, symbol: &str) -> StoreResult<Option<PriceQuote>> {
        let record = sqlx::query_as::<_, StockPriceRecord>(
            "SELECT symbol, price, updated_at FROM stock_prices WHERE symbol = ?1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        record.map(PriceQuote::try_from).transpose()
    }
}
