//! In-process consumer of the reward event channel.
//!
//! Stands in for a downstream subscriber when no webhook is configured.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::domain::entities::reward_event::EventEnvelope;

/// Log every envelope until all senders are dropped. Resolves to the number received.
pub fn spawn_event_consumer(mut rx: mpsc::Receiver<EventEnvelope>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut received = 0;
        while let Some(envelope) = rx.recv().await {
            received += 1;
            info!(
                topic = %envelope.topic,
                key = %envelope.key,
                correlation_id = %envelope.correlation_id(),
                "Received event: {}",
                envelope.payload
            );
        }
        info!("Event consumer stopped after {} events", received);
        received
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::reward::{CreateRewardRequest, NewReward};
    use crate::domain::entities::reward_event::RewardCreatedEvent;
    use chrono::Utc;

    #[tokio::test]
    async fn test_consumer_drains_until_closed() {
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_event_consumer(rx);

        let request = CreateRewardRequest {
            stock_symbol: "TCS".to_string(),
            shares: "1".to_string(),
            rewarded_at: "2025-09-25T11:30:00Z".to_string(),
        };
        let reward = NewReward::validate("u1", &request, "key-1")
            .unwrap()
            .into_reward("r-1".to_string(), Utc::now());
        let envelope = RewardCreatedEvent::from_reward(&reward).to_envelope().unwrap();

        tx.send(envelope.clone()).await.unwrap();
        tx.send(envelope).await.unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 2);
    }
}
