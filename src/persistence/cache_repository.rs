//! Shared cache backed by the `cache_entries` table.
//!
//! Every primitive is a single SQL statement, so concurrent processes pointed
//! at the same database file observe atomic claims and monotonic versions.
//! Expiry is evaluated against epoch milliseconds supplied by the caller.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

use super::DbPool;
use crate::domain::errors::StorageError;
use crate::domain::repositories::{SharedCache, StoreResult};

pub struct SqliteCache {
    pool: DbPool,
}

impl SqliteCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_millis(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

fn cache_err(e: sqlx::Error) -> StorageError {
    StorageError::Cache(e.to_string())
}

#[async_trait]
impl SharedCache for SqliteCache {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2")
                .bind(key)
                .bind(now_millis())
                .fetch_optional(&self.pool)
                .await
                .map_err(cache_err)?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let now = now_millis();
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, version, expires_at)
            VALUES (?1, ?2, 0, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry_millis(now, ttl))
        .execute(&self.pool)
        .await
        .map_err(cache_err)?;

        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = now_millis();
        let written = sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, version, expires_at)
            VALUES (?1, ?2, 0, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = excluded.version,
                expires_at = excluded.expires_at
            WHERE cache_entries.expires_at <= ?4
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry_millis(now, ttl))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(cache_err)?
        .rows_affected();

        Ok(written == 1)
    }

    async fn set_if_newer(
        &self,
        key: &str,
        value: &str,
        version: i64,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = now_millis();
        let written = sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, version, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                version = excluded.version,
                expires_at = excluded.expires_at
            WHERE cache_entries.version < excluded.version
               OR cache_entries.expires_at <= ?5
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(version)
        .bind(expiry_millis(now, ttl))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(cache_err)?
        .rows_affected();

        Ok(written == 1)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(cache_err)?;
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let removed = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?1")
            .bind(now_millis())
            .execute(&self.pool)
            .await
            .map_err(cache_err)?
            .rows_affected();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;

    async fn setup() -> SqliteCache {
        SqliteCache::new(init_database("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_expiry() {
        let cache = setup().await;
        assert!(cache
            .set_if_absent("idempotency:k", "a", Duration::from_millis(50))
            .await
            .unwrap());
        assert!(!cache
            .set_if_absent("idempotency:k", "b", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(cache.get("idempotency:k").await.unwrap().as_deref(), Some("a"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get("idempotency:k").await.unwrap(), None);
        assert!(cache
            .set_if_absent("idempotency:k", "c", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites_value() {
        let cache = setup().await;
        let ttl = Duration::from_secs(60);
        cache.set("k", "1", ttl).await.unwrap();
        cache.set("k", "2", ttl).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("2"));
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_if_newer_rejects_stale_versions() {
        let cache = setup().await;
        let ttl = Duration::from_secs(60);
        assert!(cache.set_if_newer("price:TCS", "v2", 2, ttl).await.unwrap());
        assert!(!cache.set_if_newer("price:TCS", "v1", 1, ttl).await.unwrap());
        assert!(!cache.set_if_newer("price:TCS", "v2b", 2, ttl).await.unwrap());
        assert!(cache.set_if_newer("price:TCS", "v3", 3, ttl).await.unwrap());
        assert_eq!(cache.get("price:TCS").await.unwrap().as_deref(), Some("v3"));
    }

    #[tokio::test]
    async fn test_set_if_newer_replaces_expired_entry() {
        let cache = setup().await;
        assert!(cache
            .set_if_newer("price:TCS", "v9", 9, Duration::from_millis(20))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache
            .set_if_newer("price:TCS", "v1", 1, Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = setup().await;
        cache.set("a", "1", Duration::from_millis(10)).await.unwrap();
        cache.set("b", "2", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));
    }
}
