use async_trait::async_trait;

use crate::domain::value_objects::Price;

/// Origin of fresh prices behind the cache
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_price(&self, symbol: &str) -> Result<Price, String>;
}
