// Telegram Bot API transport
//
// sendMessage for outbound text (rate limited), getUpdates long polling for
// inbound messages. The bot token is part of every URL, so request errors are
// stripped of their URL before they can reach a log line.

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{BotDispatcher, HandlerSet, InboundMessage, Messenger, ReplyRef};
use crate::error::{AppError, AppResult};

const API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub is_bot: bool,
}

impl Update {
    /// Text messages only; stickers, edits and service messages are dropped
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let text = message.text?;

        let reply_to = message.reply_to_message.map(|original| ReplyRef {
            message_id: original.message_id.to_string(),
            from_bot: original.from.map(|u| u.is_bot).unwrap_or(false),
        });

        Some(InboundMessage {
            channel_id: message.chat.id.to_string(),
            text,
            reply_to,
        })
    }
}

pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl TelegramClient {
    pub fn new(token: String, messages_per_second: u32) -> AppResult<Self> {
        let rate = NonZeroU32::new(messages_per_second).ok_or_else(|| {
            AppError::Config("TELEGRAM_MESSAGES_PER_SECOND must be positive".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {}", e.without_url())))?;

        Ok(Self {
            client,
            token,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        method: &str,
    ) -> AppResult<T> {
        let response = request.send().await.map_err(|e| AppError::from(e.without_url()))?;
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::from(e.without_url()))?;

        if !body.ok {
            return Err(AppError::Messaging(format!(
                "Telegram {} failed: {}",
                method,
                body.description.unwrap_or_default()
            )));
        }

        body.result
            .ok_or_else(|| AppError::Messaging(format!("Telegram {} returned no result", method)))
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64) -> AppResult<Vec<Update>> {
        let request = self.client.get(self.method_url("getUpdates")).query(&[
            ("offset", offset.to_string()),
            ("timeout", LONG_POLL_SECS.to_string()),
            ("allowed_updates", "[\"message\"]".to_string()),
        ]);
        self.call(request, "getUpdates").await
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send(&self, channel_id: &str, text: &str) -> AppResult<String> {
        self.limiter.until_ready().await;

        let request = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest {
                chat_id: channel_id,
                text,
            });
        let message: Message = self.call(request, "sendMessage").await?;

        debug!("Sent message {} to {}", message.message_id, channel_id);
        Ok(message.message_id.to_string())
    }
}

/// Poll for inbound messages until `stop` flips, dispatching each on its own
/// task. Returns only after every dispatched handler has finished.
pub async fn run_update_poller(
    client: Arc<TelegramClient>,
    bot: Arc<BotDispatcher>,
    mut stop: watch::Receiver<bool>,
) {
    info!("📬 Telegram update poller started");
    let mut offset = 0i64;
    let mut handlers = HandlerSet::new(bot);

    loop {
        if *stop.borrow() {
            break;
        }

        let updates = tokio::select! {
            _ = stop.changed() => break,
            updates = client.get_updates(offset) => updates,
        };

        match updates {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    if let Some(message) = update.into_inbound() {
                        handlers.dispatch(message);
                    }
                }
            }
            Err(e) => {
                warn!("getUpdates failed: {}", e);
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }

    handlers.drain().await;
    info!("Telegram update poller stopped");
}
