//! Shared Cache Trait
//!
//! Key/value primitives with TTL shared by every process instance. Each
//! primitive is a single atomic operation against the backing store.

use async_trait::async_trait;
use std::time::Duration;

use super::ledger_store::StoreResult;

#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Value under `key`, `None` when absent or expired
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditional write
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Write only when `key` is absent or expired. Returns true when this call wrote.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Write only when the stored version is lower than `version` (or the key is
    /// absent/expired). Returns true when this call wrote.
    async fn set_if_newer(
        &self,
        key: &str,
        value: &str,
        version: i64,
        ttl: Duration,
    ) -> StoreResult<bool>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> StoreResult<u64>;
}
