use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::domain::services::price_cache::PriceCache;

/// Message for the price refresher
pub enum RefresherMessage {
    /// Refresh every tracked symbol now
    RefreshNow,
    /// Shutdown the actor
    Shutdown,
}

/// Actor that periodically overwrites the quotes of all tracked symbols
pub struct PriceRefresher {
    prices: Arc<PriceCache>,
    symbols: Vec<String>,
    refresh_interval: Duration,
}

impl PriceRefresher {
    pub fn new(prices: Arc<PriceCache>, symbols: Vec<String>, refresh_interval: Duration) -> Self {
        PriceRefresher {
            prices,
            symbols,
            refresh_interval,
        }
    }

    /// Run the refresher until `Shutdown` or until every sender is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<RefresherMessage>) {
        info!(
            "Starting price refresher for {} symbols with interval {:?}",
            self.symbols.len(),
            self.refresh_interval
        );

        // First tick completes immediately
        let mut ticker = interval(self.refresh_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                }

                msg = rx.recv() => {
                    match msg {
                        Some(RefresherMessage::RefreshNow) => {
                            self.refresh().await;
                        }
                        Some(RefresherMessage::Shutdown) => {
                            info!("Price refresher shutting down");
                            break;
                        }
                        None => {
                            error!("Price refresher message channel closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn refresh(&self) {
        self.prices.refresh_all(&self.symbols).await;

        match self.prices.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => debug!("Purged {} expired cache entries", removed),
            Err(e) => warn!("Failed to purge expired cache entries: {}", e),
        }
    }
}

/// Spawn a price refresher bound to the returned control channel
pub fn spawn_price_refresher(
    prices: Arc<PriceCache>,
    symbols: Vec<String>,
    refresh_interval: Duration,
) -> (mpsc::Sender<RefresherMessage>, JoinHandle<()>) {
    let (msg_tx, msg_rx) = mpsc::channel::<RefresherMessage>(8);
    let actor = PriceRefresher::new(prices, symbols, refresh_interval);

    let handle = tokio::spawn(async move {
        actor.run(msg_rx).await;
    });

    (msg_tx, handle)
}
