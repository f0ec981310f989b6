pub mod ledger_entry;
pub mod price_quote;
pub mod reward;
pub mod reward_event;
pub mod valuation;
