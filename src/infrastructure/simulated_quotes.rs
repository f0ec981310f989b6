//! Simulated market data
//!
//! There is no real feed behind the price cache; quotes are drawn uniformly
//! from [100, 1100) INR with paise precision.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use rand::Rng;

use crate::domain::repositories::QuoteSource;
use crate::domain::value_objects::Price;

const MIN_PRICE_PAISE: i64 = 10_000;
const MAX_PRICE_PAISE: i64 = 110_000;

#[derive(Debug, Default, Clone)]
pub struct SimulatedQuoteSource;

impl SimulatedQuoteSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QuoteSource for SimulatedQuoteSource {
    async fn fetch_price(&self, _symbol: &str) -> Result<Price, String> {
        let paise = rand::thread_rng().gen_range(MIN_PRICE_PAISE..MAX_PRICE_PAISE);
        Price::new(BigDecimal::new(paise.into(), 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_prices_stay_in_band() {
        let source = SimulatedQuoteSource::new();
        let low = BigDecimal::from(100);
        let high = BigDecimal::from(1100);
        for _ in 0..200 {
            let price = source.fetch_price("RELIANCE").await.unwrap();
            assert!(price.value() >= &low);
            assert!(price.value() < &high);
        }
    }
}
