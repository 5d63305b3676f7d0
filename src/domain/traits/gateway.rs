use async_trait::async_trait;
use crate::domain::entities::{Alert, MessageRef};
use crate::application::errors::BotError;

/// Gateway trait - outbound side of the chat transport
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send a rendered alert to a channel
    async fn send_alert(&self, channel_id: u64, alert: &Alert) -> Result<MessageRef, BotError>;

    /// Delete a previously sent or received message
    async fn delete_message(&self, message: MessageRef) -> Result<(), BotError>;

    /// Get bot info
    fn bot_info(&self) -> BotInfo;
}

/// Bot information
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub id: u64,
    pub name: String,
}
