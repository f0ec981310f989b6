//! Valuation Aggregator
//!
//! Read-side views computed by grouping a user's rewards and valuing the
//! summed shares at the current cached price. All arithmetic is exact.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::price_cache::PriceCache;
use crate::domain::entities::price_quote::PriceQuote;
use crate::domain::entities::reward::Reward;
use crate::domain::entities::valuation::{
    HistoricalInr, Holding, Pagination, Portfolio, Stats, StatsScope,
};
use crate::domain::errors::RewardError;
use crate::domain::repositories::LedgerStore;
use crate::domain::value_objects::Shares;

pub struct ValuationAggregator {
    store: Arc<dyn LedgerStore>,
    prices: Arc<PriceCache>,
}

fn shares_by_symbol<'a>(rewards: impl IntoIterator<Item = &'a Reward>) -> BTreeMap<String, Shares> {
    let mut totals: BTreeMap<String, Shares> = BTreeMap::new();
    for reward in rewards {
        let total = totals
            .entry(reward.stock_symbol.clone())
            .or_insert_with(Shares::zero);
        *total = total.add(&reward.shares);
    }
    totals
}

impl ValuationAggregator {
    pub fn new(store: Arc<dyn LedgerStore>, prices: Arc<PriceCache>) -> Self {
        Self { store, prices }
    }

    /// One holding per symbol, ordered by symbol, with the exact total
    async fn value_holdings(
        &self,
        totals: BTreeMap<String, Shares>,
    ) -> Result<(Vec<Holding>, BigDecimal), RewardError> {
        let mut holdings = Vec::with_capacity(totals.len());
        let mut total = BigDecimal::zero();

        for (symbol, shares) in totals {
            let quote = self.prices.get_price(&symbol).await?;
            let value = quote.price.notional(&shares);
            total += &value;
            holdings.push(Holding {
                symbol,
                total_shares: shares,
                current_price: quote.price,
                total_value_inr: value,
                price_updated_at: quote.updated_at,
            });
        }

        Ok((holdings, total))
    }

    pub async fn portfolio(&self, user_id: &str) -> Result<Portfolio, RewardError> {
        let rewards = self.store.list_rewards_for_user(user_id).await?;
        let (holdings, portfolio_total_inr) =
            self.value_holdings(shares_by_symbol(&rewards)).await?;

        Ok(Portfolio {
            user_id: user_id.to_string(),
            holdings,
            portfolio_total_inr,
        })
    }

    pub async fn stats(&self, user_id: &str, scope: StatsScope) -> Result<Stats, RewardError> {
        let today = Utc::now().date_naive();
        let rewards = self.store.list_rewards_for_user(user_id).await?;
        let totals = shares_by_symbol(rewards.iter().filter(|r| match scope {
            StatsScope::AllTime => true,
            StatsScope::Today => r.reward_date() == today,
        }));

        let (_, portfolio_value_inr) = self.value_holdings(totals.clone()).await?;

        Ok(Stats {
            user_id: user_id.to_string(),
            scope,
            total_shares_by_symbol: totals,
            portfolio_value_inr,
        })
    }

    /// Rewards effective on `date` (UTC), ordered by `rewarded_at`
    pub async fn rewards_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Reward>, RewardError> {
        let rewards = self.store.list_rewards_for_user(user_id).await?;
        Ok(rewards
            .into_iter()
            .filter(|r| r.reward_date() == date)
            .collect())
    }

    /// One point per reward date in `[from, to]`, each valued at current prices.
    ///
    /// Open bounds are unbounded; without `page` the whole range is returned.
    pub async fn historical_inr(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        page: Option<Pagination>,
    ) -> Result<Vec<HistoricalInr>, RewardError> {
        let rewards = self.store.list_rewards_for_user(user_id).await?;

        let mut by_date: BTreeMap<NaiveDate, Vec<&Reward>> = BTreeMap::new();
        for reward in rewards.iter().filter(|r| {
            from.map_or(true, |from| r.rewarded_at >= from) && to.map_or(true, |to| r.rewarded_at <= to)
        }) {
            by_date.entry(reward.reward_date()).or_default().push(reward);
        }

        let now = Utc::now();
        let mut quotes: HashMap<String, (PriceQuote, bool)> = HashMap::new();
        let mut points = Vec::with_capacity(by_date.len());

        for (date, day_rewards) in by_date {
            let mut inr_value = BigDecimal::zero();
            let mut is_stale = false;

            for (symbol, shares) in shares_by_symbol(day_rewards) {
                if !quotes.contains_key(&symbol) {
                    let quote = self.prices.quote_for_valuation(&symbol, now).await?;
                    quotes.insert(symbol.clone(), quote);
                }
                if let Some((quote, stale)) = quotes.get(&symbol) {
                    inr_value += quote.price.notional(&shares);
                    is_stale |= *stale;
                }
            }

            points.push(HistoricalInr {
                date,
                inr_value,
                is_stale,
            });
        }

        debug!("{} historical points for {}", points.len(), user_id);

        Ok(match page {
            Some(page) => page.apply(points),
            None => points,
        })
    }
}
