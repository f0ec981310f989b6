//! In-process shared cache
//!
//! Single-process stand-in for the shared cache: every primitive runs inside
//! one critical section, so it is atomic within the process but provides no
//! cross-process guarantees. Used by tests and `CACHE_BACKEND=memory`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::domain::repositories::{SharedCache, StoreResult};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    version: i64,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }
}

#[async_trait]
impl SharedCache for InMemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        let version = entries.get(key).map(|e| e.version).unwrap_or(0);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                version,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                version: 0,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn set_if_newer(
        &self,
        key: &str,
        value: &str,
        version: i64,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(key) {
            if existing.is_live(now) && existing.version >= version {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                version,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok((before - entries.len()) as u64)
    }
}
