use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Price;

/// A price observation for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Price,
    pub updated_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(symbol: impl Into<String>, price: Price, updated_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            updated_at,
        }
    }

    /// Monotonic version used for compare-and-set writes
    pub fn version(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.updated_at
    }

    /// True when the quote is older than `ttl` at `now`
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > ttl
    }
}
