use async_trait::async_trait;

use crate::domain::entities::reward_event::EventEnvelope;
use crate::domain::errors::PublishError;

/// Messaging collaborator. At-least-once, no ordering guarantee across keys.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), PublishError>;
}
