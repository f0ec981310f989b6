pub mod event_publishers;
pub mod memory_cache;
pub mod simulated_quotes;
