//! Matcher builder functions for common update kinds.
//!
//! ```rust,ignore
//! dispatcher.register_matchers(vec![
//!     on_command("start").handler(start_handler),
//!     on_callback("help").handler(help_handler),
//!     on_message().handler(log_handler),
//! ]);
//! ```

use crate::matcher::Matcher;

/// Matches any update carrying a message.
pub fn on_message() -> Matcher {
    Matcher::new()
        .name("message")
        .check(|ctx| ctx.update().message.is_some())
}

/// Matches the bot command `/name`, with or without `@botname` and arguments.
///
/// Command matchers block: once a command is handled no other matcher sees it.
pub fn on_command(name: impl Into<String>) -> Matcher {
    let name = name.into();
    Matcher::new()
        .name(format!("command:{name}"))
        .block(true)
        .check(move |ctx| ctx.command().is_some_and(|(cmd, _)| cmd == name))
}

/// Matches callback queries whose data equals `data`.
pub fn on_callback(data: impl Into<String>) -> Matcher {
    let data = data.into();
    Matcher::new()
        .name(format!("callback:{data}"))
        .block(true)
        .check(move |ctx| ctx.callback_data() == Some(data.as_str()))
}

/// Matches callback queries whose data starts with `prefix:`.
pub fn on_callback_prefix(prefix: impl Into<String>) -> Matcher {
    let prefix = format!("{}:", prefix.into());
    Matcher::new()
        .name(format!("callback:{prefix}*"))
        .block(true)
        .check(move |ctx| ctx.callback_data().is_some_and(|d| d.starts_with(&prefix)))
}
