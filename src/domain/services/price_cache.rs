//! Price Cache
//!
//! Serves the current quote per symbol from the shared cache. Misses are
//! filled from the quote source; every write is a compare-and-set on the
//! quote timestamp so an older quote never replaces a newer one, whichever
//! process or task wrote it. Accepted quotes are also recorded in the durable
//! price tables.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::entities::price_quote::PriceQuote;
use crate::domain::errors::{RewardError, StorageError};
use crate::domain::repositories::{LedgerStore, QuoteSource, SharedCache};

pub const PRICE_KEY_PREFIX: &str = "price:";

/// Default freshness window of a cached quote
pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

pub struct PriceCache {
    cache: Arc<dyn SharedCache>,
    source: Arc<dyn QuoteSource>,
    store: Arc<dyn LedgerStore>,
    ttl: Duration,
    stale_after: chrono::Duration,
}

impl PriceCache {
    pub fn new(
        cache: Arc<dyn SharedCache>,
        source: Arc<dyn QuoteSource>,
        store: Arc<dyn LedgerStore>,
        ttl: Duration,
    ) -> Self {
        let stale_after =
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        Self {
            cache,
            source,
            store,
            ttl,
            stale_after,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn cache_key(symbol: &str) -> String {
        format!("{}{}", PRICE_KEY_PREFIX, symbol)
    }

    async fn cached(&self, symbol: &str) -> Result<Option<PriceQuote>, StorageError> {
        let Some(raw) = self.cache.get(&Self::cache_key(symbol)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(quote) => Ok(Some(quote)),
            Err(e) => {
                warn!("Discarding unreadable cached quote for {}: {}", symbol, e);
                Ok(None)
            }
        }
    }

    /// Current quote for `symbol`, filling the cache on a miss
    pub async fn get_price(&self, symbol: &str) -> Result<PriceQuote, RewardError> {
        if let Some(quote) = self.cached(symbol).await? {
            return Ok(quote);
        }

        debug!("Price cache miss for {}", symbol);
        match self.source.fetch_price(symbol).await {
            Ok(price) => {
                let quote = PriceQuote::new(symbol, price, Utc::now());
                Ok(self.store_quote(quote, "on-demand").await?)
            }
            Err(reason) => {
                warn!("Quote source failed for {}: {}", symbol, reason);
                match self.store.latest_price(symbol).await? {
                    Some(quote) => {
                        warn!(
                            "Serving last recorded {} quote from {}",
                            symbol, quote.updated_at
                        );
                        Ok(quote)
                    }
                    None => Err(RewardError::PriceUnavailable {
                        symbol: symbol.to_string(),
                        reason,
                    }),
                }
            }
        }
    }

    /// Current quote plus whether it is older than the TTL at `now`
    pub async fn quote_for_valuation(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<(PriceQuote, bool), RewardError> {
        let quote = self.get_price(symbol).await?;
        let stale = quote.is_stale(self.stale_after, now);
        Ok((quote, stale))
    }

    /// Unconditionally fetch and store a new quote for `symbol`
    pub async fn refresh_symbol(&self, symbol: &str) -> Result<PriceQuote, RewardError> {
        let price = self
            .source
            .fetch_price(symbol)
            .await
            .map_err(|reason| RewardError::PriceUnavailable {
                symbol: symbol.to_string(),
                reason,
            })?;
        let quote = PriceQuote::new(symbol, price, Utc::now());
        Ok(self.store_quote(quote, "refresher").await?)
    }

    /// Refresh every symbol, returning how many succeeded
    pub async fn refresh_all(&self, symbols: &[String]) -> usize {
        let mut refreshed = 0;
        for symbol in symbols {
            match self.refresh_symbol(symbol).await {
                Ok(quote) => {
                    debug!("Refreshed {} at {}", symbol, quote.price);
                    refreshed += 1;
                }
                Err(e) => warn!("Failed to refresh {}: {}", symbol, e),
            }
        }
        info!("Refreshed {}/{} tracked symbols", refreshed, symbols.len());
        refreshed
    }

    /// Drop expired shared-cache entries
    pub async fn purge_expired(&self) -> Result<u64, StorageError> {
        self.cache.purge_expired().await
    }

    /// Compare-and-set `quote` into the cache. Returns whichever quote is current afterwards.
    async fn store_quote(&self, quote: PriceQuote, origin: &str) -> Result<PriceQuote, StorageError> {
        let key = Self::cache_key(&quote.symbol);
        let payload =
            serde_json::to_string(&quote).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        if !self
            .cache
            .set_if_newer(&key, &payload, quote.version(), self.ttl)
            .await?
        {
            debug!("A newer {} quote is already cached", quote.symbol);
            return Ok(self.cached(&quote.symbol).await?.unwrap_or(quote));
        }

        if let Err(e) = self.store.record_price(&quote, origin).await {
            warn!("Failed to record {} price history: {}", quote.symbol, e);
        }
        Ok(quote)
    }
}
