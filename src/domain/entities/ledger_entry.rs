//! Ledger entries - the double-entry record written alongside every reward

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::reward::Reward;
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{Price, Shares};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEventType {
    Reward,
    Fee,
}

impl LedgerEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventType::Reward => "reward",
            LedgerEventType::Fee => "fee",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "reward" => Some(LedgerEventType::Reward),
            "fee" => Some(LedgerEventType::Fee),
            _ => None,
        }
    }
}

/// Fee classification. The principal entry carries `None` (stored as an empty string).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeType {
    #[serde(rename = "")]
    None,
    #[serde(rename = "brokerage")]
    Brokerage,
    #[serde(rename = "STT")]
    Stt,
}

impl FeeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeType::None => "",
            FeeType::Brokerage => "brokerage",
            FeeType::Stt => "STT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "" => Some(FeeType::None),
            "brokerage" => Some(FeeType::Brokerage),
            "STT" => Some(FeeType::Stt),
            _ => None,
        }
    }
}

/// Fee rates applied to the notional of every reward
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    pub brokerage_rate: BigDecimal,
    pub stt_rate: BigDecimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            // 0.1% and 0.025% of notional
            brokerage_rate: BigDecimal::new(1.into(), 3),
            stt_rate: BigDecimal::new(25.into(), 5),
        }
    }
}

impl FeeSchedule {
    /// Build from decimal strings, rejecting malformed or negative rates
    pub fn parse(brokerage_rate: &str, stt_rate: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            brokerage_rate: parse_rate(brokerage_rate)?,
            stt_rate: parse_rate(stt_rate)?,
        })
    }
}

fn parse_rate(raw: &str) -> Result<BigDecimal, ValidationError> {
    let rate = BigDecimal::from_str(raw.trim())
        .map_err(|_| ValidationError::InvalidRate(raw.to_string()))?;
    if rate < BigDecimal::zero() {
        return Err(ValidationError::InvalidRate(raw.to_string()));
    }
    Ok(rate)
}

/// One line of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub reward_id: String,
    pub event_type: LedgerEventType,
    pub user_id: String,
    pub stock_symbol: String,
    pub shares: Shares,
    pub inr_amount: BigDecimal,
    pub fee_type: FeeType,
    /// Price the notional was computed from
    pub unit_price: Price,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Derive the principal, brokerage and STT entries for a reward valued at `price`
    pub fn for_reward(
        reward: &Reward,
        price: &Price,
        fees: &FeeSchedule,
        created_at: DateTime<Utc>,
    ) -> [LedgerEntry; 3] {
        let notional = price.notional(&reward.shares);
        let entry = |event_type, inr_amount, fee_type| LedgerEntry {
            reward_id: reward.id.clone(),
            event_type,
            user_id: reward.user_id.clone(),
            stock_symbol: reward.stock_symbol.clone(),
            shares: reward.shares.clone(),
            inr_amount,
            fee_type,
            unit_price: price.clone(),
            created_at,
        };

        [
            entry(LedgerEventType::Reward, notional.clone(), FeeType::None),
            entry(
                LedgerEventType::Fee,
                &notional * &fees.brokerage_rate,
                FeeType::Brokerage,
            ),
            entry(LedgerEventType::Fee, &notional * &fees.stt_rate, FeeType::Stt),
        ]
    }
}
