pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::ChatId;

/// A chat message received from the platform
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Username of the author, if the platform reported one
    pub sender: Option<String>,
    /// Chat the reply goes back to
    pub chat_id: ChatId,
    /// The message text; empty for messages without text
    pub text: String,
}

/// One update from the platform's event feed
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub id: u32,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundReply {
    pub chat_id: ChatId,
    pub text: String,
}

/// Delivers replies back to the platform.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, reply: OutboundReply) -> Result<()>;
}
