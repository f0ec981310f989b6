pub mod idempotency_guard;
pub mod ledger_writer;
pub mod price_cache;
pub mod reward_service;
pub mod valuation;

#[cfg(test)]
pub(crate) mod test_support;
