use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::errors::ValidationError;

/// Fractional share count, kept as an exact decimal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shares(BigDecimal);

impl Shares {
    /// Parse a caller-supplied share count. Malformed or non-positive input is rejected.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField("shares"));
        }
        let value = BigDecimal::from_str(trimmed)
            .map_err(|_| ValidationError::InvalidShares(raw.to_string()))?;
        if value <= BigDecimal::zero() {
            return Err(ValidationError::NonPositiveShares(raw.to_string()));
        }
        Ok(Shares(value))
    }

    /// Wrap a value already known to be valid (e.g. read back from the store)
    pub fn from_decimal(value: BigDecimal) -> Self {
        Shares(value)
    }

    pub fn zero() -> Self {
        Shares(BigDecimal::zero())
    }

    pub fn value(&self) -> &BigDecimal {
        &self.0
    }

    pub fn add(&self, other: &Shares) -> Shares {
        Shares(&self.0 + &other.0)
    }
}

impl std::fmt::Display for Shares {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
