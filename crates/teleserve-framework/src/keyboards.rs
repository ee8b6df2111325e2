//! Keyboard builders for common UI patterns.

use teleserve_core::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, ReplyKeyboardMarkup,
};

/// Callback data sent by the page indicator button, which does nothing.
pub const NOOP_CALLBACK: &str = "noop";

/// A single button that opens the Mini App at `url`.
pub fn webapp_keyboard(url: &str, text: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![InlineKeyboardButton::web_app(text, url)]],
    }
}

/// Labels and callback data of a confirm/cancel keyboard.
#[derive(Debug, Clone)]
pub struct ConfirmOptions {
    pub confirm_text: String,
    pub cancel_text: String,
    pub confirm_data: String,
    pub cancel_data: String,
}

impl Default for ConfirmOptions {
    fn default() -> Self {
        Self {
            confirm_text: "✅ Confirm".to_string(),
            cancel_text: "❌ Cancel".to_string(),
            confirm_data: "confirm".to_string(),
            cancel_data: "cancel".to_string(),
        }
    }
}

/// A confirm/cancel row.
pub fn confirm_keyboard(options: ConfirmOptions) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![
            InlineKeyboardButton::callback(options.confirm_text, options.confirm_data),
            InlineKeyboardButton::callback(options.cancel_text, options.cancel_data),
        ]],
    }
}

/// A `◀️ n/total ▶️` row. Arrows are omitted on the first and last page;
/// they send `"{prefix}:{page}"`.
pub fn pagination_keyboard(current_page: u32, total_pages: u32, prefix: &str) -> InlineKeyboardMarkup {
    let mut row = Vec::with_capacity(3);
    if current_page > 1 {
        row.push(InlineKeyboardButton::callback(
            "◀️",
            format!("{prefix}:{}", current_page - 1),
        ));
    }
    row.push(InlineKeyboardButton::callback(
        format!("{current_page}/{total_pages}"),
        NOOP_CALLBACK,
    ));
    if current_page < total_pages {
        row.push(InlineKeyboardButton::callback(
            "▶️",
            format!("{prefix}:{}", current_page + 1),
        ));
    }
    InlineKeyboardMarkup {
        inline_keyboard: vec![row],
    }
}

/// A resized reply keyboard laid out two buttons per row.
pub fn main_menu_keyboard<S: AsRef<str>>(items: &[S]) -> ReplyKeyboardMarkup {
    ReplyKeyboardMarkup {
        keyboard: items
            .chunks(2)
            .map(|row| row.iter().map(|s| KeyboardButton::new(s.as_ref())).collect())
            .collect(),
        resize_keyboard: true,
    }
}
