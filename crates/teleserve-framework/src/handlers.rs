//! Default handlers shared by every bot: `/start`, `/help` and the `help`
//! callback button.

use std::sync::Arc;

use teleserve_core::{InlineKeyboardButton, InlineKeyboardMarkup, SendMessageOptions};

use crate::context::UpdateContext;
use crate::error::HandlerResult;
use crate::markdown::escape_md;
use crate::matcher::Matcher;
use crate::matcher_builders::{on_callback, on_command};

/// Callback data of the help button.
pub const HELP_CALLBACK: &str = "help";

/// Settings for the default handlers.
#[derive(Debug, Clone)]
pub struct CommonHandlers {
    /// Shown in the welcome message. Escaped before sending.
    pub app_name: String,
    /// Mini App opened by the welcome keyboard, usually the main bot's `app_url`.
    pub app_url: Option<String>,
    /// Plain text sent for `/help`. Escaped before sending.
    pub help_text: String,
}

impl CommonHandlers {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_url: None,
            help_text: "Available commands:\n/start - open the app\n/help - show this message"
                .to_string(),
        }
    }

    pub fn with_app_url(mut self, app_url: Option<String>) -> Self {
        self.app_url = app_url.filter(|url| !url.is_empty());
        self
    }

    pub fn with_help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = help_text.into();
        self
    }

    /// Keyboard attached to the welcome message.
    pub fn start_keyboard(&self) -> InlineKeyboardMarkup {
        let mut rows = Vec::with_capacity(2);
        if let Some(url) = &self.app_url {
            rows.push(vec![InlineKeyboardButton::web_app(
                format!("🚀 Open {}", self.app_name),
                url,
            )]);
        }
        rows.push(vec![InlineKeyboardButton::callback("📖 Help", HELP_CALLBACK)]);
        InlineKeyboardMarkup {
            inline_keyboard: rows,
        }
    }

    /// Welcome text, already escaped for MarkdownV2.
    pub fn start_text(&self) -> String {
        format!("👋 Welcome to {}", escape_md(&self.app_name))
    }

    /// Builds the matchers for `/start`, `/help` and the help button.
    pub fn matchers(self) -> Vec<Matcher> {
        let settings = Arc::new(self);

        let start = {
            let settings = Arc::clone(&settings);
            on_command("start").handler(move |ctx: Arc<UpdateContext>| {
                let settings = Arc::clone(&settings);
                async move { cmd_start(&ctx, &settings).await }
            })
        };

        let help = {
            let settings = Arc::clone(&settings);
            on_command("help").handler(move |ctx: Arc<UpdateContext>| {
                let settings = Arc::clone(&settings);
                async move { cmd_help(&ctx, &settings).await }
            })
        };

        let help_button = on_callback(HELP_CALLBACK).handler(move |ctx: Arc<UpdateContext>| {
            let settings = Arc::clone(&settings);
            async move {
                ctx.answer_callback(None).await?;
                cmd_help(&ctx, &settings).await
            }
        });

        vec![start, help, help_button]
    }
}

async fn cmd_start(ctx: &UpdateContext, settings: &CommonHandlers) -> HandlerResult {
    ctx.reply_with(
        &settings.start_text(),
        SendMessageOptions::with_markup(settings.start_keyboard()),
    )
    .await?;
    Ok(())
}

async fn cmd_help(ctx: &UpdateContext, settings: &CommonHandlers) -> HandlerResult {
    ctx.reply(&escape_md(&settings.help_text)).await?;
    Ok(())
}
