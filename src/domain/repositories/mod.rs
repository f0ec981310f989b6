pub mod event_publisher;
pub mod ledger_store;
pub mod quote_source;
pub mod shared_cache;

pub use event_publisher::EventPublisher;
pub use ledger_store::{LedgerStore, StoreResult};
pub use quote_source::QuoteSource;
pub use shared_cache::SharedCache;
