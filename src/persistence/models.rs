//! Database Models
//!
//! Row shapes for the reward, ledger and price tables. Decimals are stored as
//! TEXT and parsed back exactly.

use bigdecimal::BigDecimal;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::FromRow;
use std::str::FromStr;

use crate::domain::entities::ledger_entry::{FeeType, LedgerEntry, LedgerEventType};
use crate::domain::entities::price_quote::PriceQuote;
use crate::domain::entities::reward::{Reward, RewardStatus};
use crate::domain::errors::StorageError;
use crate::domain::value_objects::{Price, Shares};

/// Reward record in database
#[derive(Debug, Clone, FromRow)]
pub struct RewardRecord {
    pub id: String,
    pub user_id: String,
    pub stock_symbol: String,
    pub shares: String,
    pub rewarded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub unique_hash: String,
    pub idempotency_key: Option<String>,
    pub status: String,
}

/// Ledger entry record in database
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntryRecord {
    pub id: i64,
    pub reward_id: String,
    pub event_type: String,
    pub user_id: String,
    pub stock_symbol: String,
    pub shares: String,
    pub inr_amount: String,
    pub fee_type: String,
    pub unit_price: String,
    pub created_at: DateTime<Utc>,
}

/// Latest price record in database
#[derive(Debug, Clone, FromRow)]
pub struct StockPriceRecord {
    pub symbol: String,
    pub price: String,
    /// Epoch milliseconds
    pub updated_at: i64,
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<BigDecimal, StorageError> {
    BigDecimal::from_str(raw)
        .map_err(|_| StorageError::Corrupt(format!("{} is not a decimal: '{}'", column, raw)))
}

pub(crate) fn parse_price(column: &str, raw: &str) -> Result<Price, StorageError> {
    Price::new(parse_decimal(column, raw)?)
        .map_err(|e| StorageError::Corrupt(format!("{}: {}", column, e)))
}

pub(crate) fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StorageError::Corrupt(format!("invalid timestamp millis {}", millis)))
}

impl TryFrom<RewardRecord> for Reward {
    type Error = StorageError;

    fn try_from(record: RewardRecord) -> Result<Self, Self::Error> {
        let status = RewardStatus::parse(&record.status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown reward status '{}'", record.status))
        })?;

        Ok(Reward {
            shares: Shares::from_decimal(parse_decimal("reward.shares", &record.shares)?),
            id: record.id,
            user_id: record.user_id,
            stock_symbol: record.stock_symbol,
            rewarded_at: record.rewarded_at,
            created_at: record.created_at,
            unique_hash: record.unique_hash,
            idempotency_key: record.idempotency_key,
            status,
        })
    }
}

impl TryFrom<LedgerEntryRecord> for LedgerEntry {
    type Error = StorageError;

    fn try_from(record: LedgerEntryRecord) -> Result<Self, Self::Error> {
        let event_type = LedgerEventType::parse(&record.event_type).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown event_type '{}'", record.event_type))
        })?;
        let fee_type = FeeType::parse(&record.fee_type).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown fee_type '{}'", record.fee_type))
        })?;

        Ok(LedgerEntry {
            shares: Shares::from_decimal(parse_decimal("ledger_entries.shares", &record.shares)?),
            inr_amount: parse_decimal("ledger_entries.inr_amount", &record.inr_amount)?,
            unit_price: parse_price("ledger_entries.unit_price", &record.unit_price)?,
            reward_id: record.reward_id,
            event_type,
            user_id: record.user_id,
            stock_symbol: record.stock_symbol,
            fee_type,
            created_at: record.created_at,
        })
    }
}

impl TryFrom<StockPriceRecord> for PriceQuote {
    type Error = StorageError;

    fn try_from(record: StockPriceRecord) -> Result<Self, Self::Error> {
        Ok(PriceQuote {
            price: parse_price("stock_prices.price", &record.price)?,
            updated_at: millis_to_datetime(record.updated_at)?,
            symbol: record.symbol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_decimal_is_reported() {
        let record = StockPriceRecord {
            symbol: "TCS".to_string(),
            price: "12,5".to_string(),
            updated_at: 0,
        };
        let err = PriceQuote::try_from(record).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[test]
    fn test_unknown_status_is_reported() {
        let record = RewardRecord {
            id: "r".to_string(),
            user_id: "u".to_string(),
            stock_symbol: "TCS".to_string(),
            shares: "1".to_string(),
            rewarded_at: Utc::now(),
            created_at: Utc::now(),
            unique_hash: "h".to_string(),
            idempotency_key: None,
            status: "revoked".to_string(),
        };
        assert!(Reward::try_from(record).is_err());
    }
}
