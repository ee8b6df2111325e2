//! Telegram Bot API data model.
//!
//! Only the subset of the Bot API that teleserve reads or produces is
//! modelled here. Unknown fields are ignored on deserialization; the raw
//! JSON of an [`Update`] is kept alongside the typed view so handlers can
//! reach anything not covered.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Telegram user or bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl User {
    /// Returns `@username` if the user has one, otherwise the first name.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(username) => format!("@{username}"),
            None => self.first_name.clone(),
        }
    }
}

/// A chat (private, group, supergroup or channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    /// One of `private`, `group`, `supergroup`, `channel`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// An incoming message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    pub chat: Chat,
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Message {
    /// Extracts the bot command at the start of the text.
    ///
    /// `/start@my_bot payload` yields `Some(("start", "payload"))`.
    pub fn command(&self) -> Option<(&str, &str)> {
        let text = self.text.as_deref()?.strip_prefix('/')?;
        let (head, args) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            return None;
        }
        Some((name, args))
    }
}

/// A press on an inline keyboard button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// An incoming update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
    /// The update as received.
    #[serde(skip)]
    pub raw: Value,
}

impl Update {
    /// Parses an update, keeping the original JSON in [`Update::raw`].
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let mut update: Update = serde_json::from_value(value.clone())?;
        update.raw = value;
        Ok(update)
    }

    /// Parses an update from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Returns the user that caused this update, if any.
    pub fn from_user(&self) -> Option<&User> {
        if let Some(message) = &self.message {
            return message.from.as_ref();
        }
        if let Some(query) = &self.callback_query {
            return Some(&query.from);
        }
        self.edited_message.as_ref().and_then(|m| m.from.as_ref())
    }

    /// Returns the chat the update belongs to, if any.
    pub fn chat(&self) -> Option<&Chat> {
        self.message
            .as_ref()
            .or(self.edited_message.as_ref())
            .map(|m| &m.chat)
            .or_else(|| {
                self.callback_query
                    .as_ref()
                    .and_then(|q| q.message.as_ref())
                    .map(|m| &m.chat)
            })
    }

    /// A short name for the kind of update, used in logs.
    pub fn kind(&self) -> &'static str {
        if self.message.is_some() {
            "message"
        } else if self.callback_query.is_some() {
            "callback_query"
        } else if self.edited_message.is_some() {
            "edited_message"
        } else {
            "other"
        }
    }
}

// =============================================================================
// Keyboards
// =============================================================================

/// A Mini App to open from a button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAppInfo {
    pub url: String,
}

/// A button of an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_app: Option<WebAppInfo>,
}

impl InlineKeyboardButton {
    /// A button that sends `data` back as a callback query.
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
            web_app: None,
        }
    }

    /// A button that opens a Mini App.
    pub fn web_app(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: None,
            web_app: Some(WebAppInfo { url: url.into() }),
        }
    }

    /// A button that opens a URL.
    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
            web_app: None,
        }
    }
}

/// An inline keyboard attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// A button of a reply keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardButton {
    pub text: String,
}

impl KeyboardButton {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A custom reply keyboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyKeyboardMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
    #[serde(default)]
    pub resize_keyboard: bool,
}

/// Any markup that can be sent with a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    Inline(InlineKeyboardMarkup),
    Reply(ReplyKeyboardMarkup),
}

impl From<InlineKeyboardMarkup> for ReplyMarkup {
    fn from(markup: InlineKeyboardMarkup) -> Self {
        Self::Inline(markup)
    }
}

impl From<ReplyKeyboardMarkup> for ReplyMarkup {
    fn from(markup: ReplyKeyboardMarkup) -> Self {
        Self::Reply(markup)
    }
}

/// Information about the currently set webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pending_update_count: i64,
    #[serde(default)]
    pub last_error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_update(text: &str) -> Value {
        json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "chat": {"id": 42, "type": "private"},
                "date": 1_700_000_000,
                "text": text,
                "entities": [{"type": "bot_command", "offset": 0, "length": 6}]
            }
        })
    }

    #[test]
    fn test_update_keeps_raw_json() {
        let value = message_update("/start");
        let update = Update::from_value(value.clone()).unwrap();
        assert_eq!(update.raw, value);
        assert_eq!(update.kind(), "message");
        assert_eq!(update.from_user().unwrap().id, 42);
        assert_eq!(update.chat().unwrap().kind, "private");
    }

    #[test]
    fn test_command_parsing() {
        let update = Update::from_value(message_update("/start@my_bot ref_123")).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.command(), Some(("start", "ref_123")));

        let update = Update::from_value(message_update("hello")).unwrap();
        assert_eq!(update.message.unwrap().command(), None);

        let update = Update::from_value(message_update("/")).unwrap();
        assert_eq!(update.message.unwrap().command(), None);
    }

    #[test]
    fn test_callback_update_user() {
        let update = Update::from_value(json!({
            "update_id": 11,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 7, "first_name": "Bo"},
                "data": "help"
            }
        }))
        .unwrap();
        assert_eq!(update.kind(), "callback_query");
        assert_eq!(update.from_user().unwrap().display_name(), "Bo");
        assert!(update.chat().is_none());
    }

    #[test]
    fn test_button_serialization_skips_empty_fields() {
        let button = InlineKeyboardButton::web_app("Open", "https://app.example.com");
        let value = serde_json::to_value(&button).unwrap();
        assert_eq!(
            value,
            json!({"text": "Open", "web_app": {"url": "https://app.example.com"}})
        );
    }
}
