pub mod event_consumer;
pub mod price_refresher;

pub use event_consumer::spawn_event_consumer;
pub use price_refresher::{spawn_price_refresher, PriceRefresher, RefresherMessage};
