//! Event Publishers
//!
//! Concrete transports for `RewardCreated` events. None of them retry: a
//! failed delivery is reported once and the caller logs it.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::entities::reward_event::EventEnvelope;
use crate::domain::errors::PublishError;
use crate::domain::repositories::EventPublisher;

/// No-op transport that only logs the event
#[derive(Debug, Default, Clone)]
pub struct LoggingPublisher;

#[async_trait]
impl EventPublisher for LoggingPublisher {
    fn name(&self) -> &str {
        "logging"
    }

    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        info!(
            topic = %envelope.topic,
            key = %envelope.key,
            correlation_id = %envelope.correlation_id(),
            "Noop publish: {}",
            envelope.payload
        );
        Ok(())
    }
}

/// Hands events to an in-process consumer over a bounded channel.
///
/// Uses `try_send`, so a full channel fails fast instead of stalling the writer.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<EventEnvelope>,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Create a publisher together with the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    fn name(&self) -> &str {
        "channel"
    }

    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        self.tx.try_send(envelope.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => PublishError::ChannelClosed,
        })
    }
}

/// POSTs the JSON payload to an HTTP endpoint
pub struct WebhookPublisher {
    client: Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for WebhookPublisher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Event-Topic", &envelope.topic)
            .header("X-Event-Key", &envelope.key)
            .header("X-Correlation-ID", envelope.correlation_id())
            .body(envelope.payload.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PublishError::Transport(format!("Webhook timed out: {}", e))
                } else {
                    PublishError::Transport(format!("Webhook request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Transport(format!(
                "Webhook responded with {}",
                status
            )));
        }

        debug!("Delivered {} event for key {}", envelope.topic, envelope.key);
        Ok(())
    }
}
