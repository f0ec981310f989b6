//! Fakes shared by the service tests

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::entities::reward::CreateRewardRequest;
use crate::domain::entities::reward_event::EventEnvelope;
use crate::domain::errors::PublishError;
use crate::domain::repositories::{EventPublisher, QuoteSource};
use crate::domain::value_objects::Price;
use crate::persistence::init_database;
use crate::persistence::ledger_repository::SqliteLedgerStore;

pub fn dec(raw: &str) -> BigDecimal {
    BigDecimal::from_str(raw).unwrap()
}

pub fn request(symbol: &str, shares: &str, rewarded_at: &str) -> CreateRewardRequest {
    CreateRewardRequest {
        stock_symbol: symbol.to_string(),
        shares: shares.to_string(),
        rewarded_at: rewarded_at.to_string(),
    }
}

pub async fn memory_store() -> Arc<SqliteLedgerStore> {
    Arc::new(SqliteLedgerStore::new(
        init_database("sqlite::memory:").await.unwrap(),
    ))
}

/// Quote source returning a settable price, optionally slow, or failing on demand
pub struct FixedQuoteSource {
    price: Mutex<BigDecimal>,
    delay: Mutex<Duration>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FixedQuoteSource {
    pub fn new(price: &str) -> Self {
        Self {
            price: Mutex::new(dec(price)),
            delay: Mutex::new(Duration::ZERO),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, price: &str) {
        *self.price.lock().unwrap() = dec(price);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for FixedQuoteSource {
    async fn fetch_price(&self, symbol: &str) -> Result<Price, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(format!("feed down for {}", symbol));
        }
        Price::new(self.price.lock().unwrap().clone())
    }
}

/// Publisher that keeps every envelope, or fails every call
#[derive(Default)]
pub struct RecordingPublisher {
    pub envelopes: Mutex<Vec<EventEnvelope>>,
    pub failing: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            envelopes: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn published(&self) -> Vec<EventEnvelope> {
        self.envelopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        if self.failing {
            return Err(PublishError::Transport("broker unavailable".to_string()));
        }
        self.envelopes.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}
