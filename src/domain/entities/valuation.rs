//! Read-side views produced by the valuation aggregator

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::value_objects::{Price, Shares};

/// Current value of one symbol in a user's portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub total_shares: Shares,
    pub current_price: Price,
    pub total_value_inr: BigDecimal,
    pub price_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub user_id: String,
    /// Ordered by symbol
    pub holdings: Vec<Holding>,
    /// Exact sum of `holdings[*].total_value_inr`
    pub portfolio_total_inr: BigDecimal,
}

/// Which rewards a stats query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatsScope {
    #[default]
    AllTime,
    Today,
}

impl StatsScope {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "all" | "all_time" | "alltime" => Some(StatsScope::AllTime),
            "today" => Some(StatsScope::Today),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub user_id: String,
    pub scope: StatsScope,
    pub total_shares_by_symbol: BTreeMap<String, Shares>,
    pub portfolio_value_inr: BigDecimal,
}

/// INR value of the rewards granted on one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalInr {
    pub date: NaiveDate,
    pub inr_value: BigDecimal,
    /// At least one contributing quote was older than the cache TTL
    pub is_stale: bool,
}

/// 1-based page selection over an ordered result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    size: u32,
}

impl Pagination {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: page.max(1),
            size: size.max(1),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = (self.page as usize)
            .saturating_sub(1)
            .saturating_mul(self.size as usize);
        items.into_iter().skip(skip).take(self.size as usize).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_slices_ordered_items() {
        let items: Vec<u32> = (1..=7).collect();
        assert_eq!(Pagination::new(1, 3).apply(items.clone()), vec![1, 2, 3]);
        assert_eq!(Pagination::new(3, 3).apply(items.clone()), vec![7]);
        assert!(Pagination::new(4, 3).apply(items).is_empty());
    }

    #[test]
    fn test_pagination_clamps_zero() {
        let page = Pagination::new(0, 0);
        assert_eq!((page.page(), page.size()), (1, 1));
    }

    #[test]
    fn test_pagination_zero_page_reads_first_page() {
        let items: Vec<u32> = (1..=7).collect();
        let raw = Pagination { page: 0, size: 3 };
        assert_eq!(raw.apply(items), vec![1, 2, 3]);
    }

    #[test]
    fn test_stats_scope_parse() {
        assert_eq!(StatsScope::parse("today"), Some(StatsScope::Today));
        assert_eq!(StatsScope::parse("ALL"), Some(StatsScope::AllTime));
        assert_eq!(StatsScope::parse("week"), None);
    }
}
