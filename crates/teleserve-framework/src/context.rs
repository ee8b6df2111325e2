//! Per-update context handed to middlewares and handlers.

use std::sync::Arc;

use serde_json::Value;
use teleserve_core::{SendMessageOptions, TelegramApi, Update, User};

use crate::error::HandlerError;

/// Everything a handler needs to react to one update.
///
/// One context is created per update and shared as `Arc<UpdateContext>`
/// across the middleware chain and all matchers.
pub struct UpdateContext {
    update: Update,
    bot_name: String,
    api: Arc<TelegramApi>,
}

impl std::fmt::Debug for UpdateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateContext")
            .field("bot", &self.bot_name)
            .field("update_id", &self.update.update_id)
            .field("kind", &self.update.kind())
            .finish()
    }
}

impl UpdateContext {
    pub fn new(update: Update, bot_name: impl Into<String>, api: Arc<TelegramApi>) -> Self {
        Self {
            update,
            bot_name: bot_name.into(),
            api,
        }
    }

    pub fn update(&self) -> &Update {
        &self.update
    }

    /// Name of the bot that received the update.
    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Bot API client of the receiving bot.
    pub fn api(&self) -> &TelegramApi {
        &self.api
    }

    /// The user behind the update, if any.
    pub fn user(&self) -> Option<&User> {
        self.update.from_user()
    }

    /// Text of the message, if the update is a message with text.
    pub fn text(&self) -> Option<&str> {
        self.update.message.as_ref()?.text.as_deref()
    }

    /// Bot command and its arguments, if the update is a command message.
    pub fn command(&self) -> Option<(&str, &str)> {
        self.update.message.as_ref()?.command()
    }

    /// Data of the callback query, if the update is one.
    pub fn callback_data(&self) -> Option<&str> {
        self.update.callback_query.as_ref()?.data.as_deref()
    }

    /// Sends a message to the chat the update came from.
    pub async fn reply(&self, text: &str) -> Result<Value, HandlerError> {
        self.reply_with(text, SendMessageOptions::default()).await
    }

    /// Sends a message with options to the chat the update came from.
    pub async fn reply_with(
        &self,
        text: &str,
        options: SendMessageOptions,
    ) -> Result<Value, HandlerError> {
        let chat = self
            .update
            .chat()
            .ok_or(HandlerError::NoChat(self.update.update_id))?;
        Ok(self.api.send_message(chat.id, text, options).await?)
    }

    /// Acknowledges the callback query, optionally showing a notification.
    pub async fn answer_callback(&self, text: Option<&str>) -> Result<bool, HandlerError> {
        let query = self
            .update
            .callback_query
            .as_ref()
            .ok_or(HandlerError::NotCallback(self.update.update_id))?;
        Ok(self.api.answer_callback_query(&query.id, text).await?)
    }
}
