//! # teleserve framework
//!
//! Update handling for teleserve bots.
//!
//! This layer provides:
//! - [`Dispatcher`]: runs middlewares, then matchers, for every update
//! - [`Matcher`]: groups handlers behind a check (`on_command`, `on_callback`, ...)
//! - [`Middleware`]: before/after hooks, with logging and throttling built in
//! - Keyboard builders and MarkdownV2 escaping
//! - [`CommonHandlers`]: default `/start` and `/help`

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod keyboards;
pub mod markdown;
pub mod matcher;
pub mod matcher_builders;
pub mod middleware;

pub use context::UpdateContext;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{HandlerError, HandlerResult};
pub use handler::{BoxFuture, BoxedHandler, Handler, into_handler};
pub use handlers::CommonHandlers;
pub use keyboards::{
    ConfirmOptions, confirm_keyboard, main_menu_keyboard, pagination_keyboard, webapp_keyboard,
};
pub use markdown::escape_md;
pub use matcher::{CheckFn, Matcher, MatcherResponse};
pub use matcher_builders::{on_callback, on_callback_prefix, on_command, on_message};
pub use middleware::{LoggingMiddleware, Middleware, ThrottlingMiddleware};
