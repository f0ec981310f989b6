use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use super::shares::Shares;

/// Per-share price in INR, kept as an exact decimal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(BigDecimal);

impl Price {
    pub fn new(value: BigDecimal) -> Result<Self, String> {
        if value >= BigDecimal::zero() {
            Ok(Price(value))
        } else {
            Err("Price must be non-negative".to_string())
        }
    }

    pub fn value(&self) -> &BigDecimal {
        &self.0
    }

    /// Notional value of `shares` at this price, without rounding
    pub fn notional(&self, shares: &Shares) -> BigDecimal {
        shares.value() * &self.0
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
