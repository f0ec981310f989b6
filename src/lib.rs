//! Reward Ledger Library
//!
//! Idempotent recording of stock rewards with double-entry ledger rows,
//! a shared price cache and INR valuation of user holdings.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
