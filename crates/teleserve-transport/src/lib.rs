//! # teleserve transport
//!
//! The HTTP face of teleserve, built on axum.
//!
//! - Health and API documentation routes
//! - The Telegram webhook route, which hands updates to a
//!   [`WebhookReceiver`](teleserve_core::WebhookReceiver)
//! - `/api/v1`: Mini App login, token refresh, current user, bot list
//!
//! ```text
//!            ┌───────────────────────────── HttpServer ─────────────────────────────┐
//! request ──▶│ log_request ─▶ router ─┬─ /health, /docs, /redoc, /openapi.json      │
//!            │                        ├─ /tg-bot/webhook/{bot} ─▶ WebhookReceiver   │
//!            │                        └─ /api/v1/* ─▶ TokenService, UserRepository  │
//!            └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod docs;
pub mod error;
pub mod router;
pub mod server;
pub mod state;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::AuthUser;
pub use error::{HttpError, HttpResult, TransportError, TransportResult};
pub use router::build_router;
pub use server::HttpServer;
pub use state::{AppState, ServerOptions, SharedState};
pub use webhook::{SECRET_TOKEN_HEADER, WEBHOOK_ROUTE};
