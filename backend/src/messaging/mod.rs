pub mod bot;
pub mod commands;
pub mod telegram;
pub mod templates;

pub use bot::{BotDispatcher, HandlerSet};
pub use commands::Command;
pub use telegram::TelegramClient;

use async_trait::async_trait;

use crate::error::AppResult;

/// Outbound side of the user channel
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` to `channel_id`, returning the message id replies will reference
    async fn send(&self, channel_id: &str, text: &str) -> AppResult<String>;
}

/// The message an inbound message replies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRef {
    pub message_id: String,
    pub from_bot: bool,
}

/// One inbound user message, transport details stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel_id: String,
    pub text: String,
    pub reply_to: Option<ReplyRef>,
}
