//! # teleserve core
//!
//! Foundation types shared by every teleserve crate.
//!
//! - **Telegram model**: [`Update`], [`Message`], keyboards ([`types`])
//! - **Bot API client**: [`TelegramApi`] over `reqwest`
//! - **Identifiers**: 53-bit [`snowflake`] IDs
//! - **Security**: HMAC signatures, HS256 tokens, Mini App init data ([`security`])
//! - **Integration**: [`WebhookReceiver`], the seam between the HTTP layer and the bot runtime
//!
//! ```text
//! ┌──────────────┐  WebhookReceiver  ┌─────────────┐   TelegramApi   ┌──────────┐
//! │  transport   │──────────────────▶│   runtime   │────────────────▶│ Telegram │
//! │ (axum router)│                   │ (BotManager)│                 │ Bot API  │
//! └──────────────┘                   └─────────────┘                 └──────────┘
//! ```

pub mod api;
pub mod error;
pub mod integration;
pub mod security;
pub mod snowflake;
pub mod types;

pub use api::{DEFAULT_API_BASE, DEFAULT_PARSE_MODE, SendMessageOptions, TelegramApi, UpdateBatch};
pub use error::{
    ApiError, ApiResult, SnowflakeError, SnowflakeResult, TokenError, TokenResult, WebAppAuthError,
};
pub use integration::{BotSummary, BoxedWebhookReceiver, WebhookReceiver, WebhookTarget};
pub use security::{
    AccessToken, Claims, RefreshToken, TokenPair, TokenService, TokenType, WebAppInitData,
};
pub use snowflake::{SnowflakeGenerator, generate_id, init_snowflake};
pub use types::{
    CallbackQuery, Chat, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, Message,
    ReplyKeyboardMarkup, ReplyMarkup, Update, User, WebAppInfo,
};
