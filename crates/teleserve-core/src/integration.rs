//! Capabilities exchanged between the HTTP layer and the bot runtime.
//!
//! The transport crate receives webhook calls but must not depend on the
//! runtime crate that owns the bots. It talks to a [`WebhookReceiver`]
//! instead, which the bot manager implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::types::Update;

/// How a bot is configured to receive webhook calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookTarget {
    /// No bot by that name.
    NotFound,
    /// The bot polls; pushed updates are refused.
    Polling,
    /// The bot accepts pushed updates. When `secret` is set the request
    /// must carry it in `X-Telegram-Bot-Api-Secret-Token`.
    Webhook { secret: Option<String> },
}

/// Public description of a managed bot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BotSummary {
    pub name: String,
    pub mode: String,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_url: Option<String>,
}

/// Receives updates pushed to the webhook route.
#[async_trait]
pub trait WebhookReceiver: Send + Sync {
    /// Resolves how `bot_name` accepts webhook calls.
    async fn lookup(&self, bot_name: &str) -> WebhookTarget;

    /// Feeds one update to the bot. Returns `false` if the bot disappeared
    /// between lookup and delivery.
    async fn feed_update(&self, bot_name: &str, update: Update) -> bool;

    /// Lists the managed bots.
    async fn summaries(&self) -> Vec<BotSummary> {
        Vec::new()
    }
}

/// Shared receiver handle.
pub type BoxedWebhookReceiver = Arc<dyn WebhookReceiver>;
