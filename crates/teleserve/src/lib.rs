//! # teleserve
//!
//! A Telegram bot backend: several bots, polling or webhook, behind one HTTP
//! service with a small JSON API, a SQL database, Redis and a job scheduler.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────── teleserve-runtime ──────────┐
//! Telegram ──────▶│ BotManager ─▶ Dispatcher ─▶ handlers  │──▶ Bot API
//!   (webhook)     │     ▲            (framework)          │
//!       │         │     │ WebhookReceiver    Scheduler    │
//!       ▼         └─────┼──────────────────────┬──────────┘
//! teleserve-transport ──┘                      ▼
//!   (axum: /health, /docs, /api/v1)     teleserve-storage (sqlx, redis)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use teleserve::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = load_settings()?;
//!     TeleserveRuntime::new(settings).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The `teleserve` binary wraps the same runtime with `serve`, `migrate` and
//! `config` commands.

pub mod cli;

pub use teleserve_core as core;
pub use teleserve_framework as framework;
pub use teleserve_runtime as runtime;
pub use teleserve_storage as storage;
pub use teleserve_transport as transport;

/// Commonly used types.
///
/// ```rust,ignore
/// use teleserve::prelude::*;
/// ```
pub mod prelude {
    pub use teleserve_runtime::{
        BotManager, ConfigLoader, Environment, Scheduler, Settings, TeleserveRuntime,
        load_settings,
    };

    pub use teleserve_framework::{
        CommonHandlers, Dispatcher, HandlerResult, Matcher, Middleware, UpdateContext, escape_md,
        on_callback, on_callback_prefix, on_command, on_message,
    };

    pub use teleserve_core::{TelegramApi, Update, generate_id};
}
