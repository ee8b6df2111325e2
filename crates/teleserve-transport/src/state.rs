//! Shared state handed to every request handler.

use std::sync::Arc;

use teleserve_core::{BoxedWebhookReceiver, TokenService};
use teleserve_storage::UserRepository;

/// Static settings of the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub app_name: String,
    pub version: String,
    /// Serve `/docs`, `/redoc` and `/openapi.json`. Off in production.
    pub docs_enabled: bool,
}

impl ServerOptions {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            docs_enabled: true,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_docs(mut self, docs_enabled: bool) -> Self {
        self.docs_enabled = docs_enabled;
        self
    }
}

/// Everything request handlers need.
pub struct AppState {
    pub options: ServerOptions,
    /// Bots that accept webhook calls.
    pub receiver: BoxedWebhookReceiver,
    pub tokens: TokenService,
    /// Present when a database is configured.
    pub users: Option<UserRepository>,
    /// Token of the main bot, used to validate Mini App init data.
    pub main_bot_token: Option<String>,
}

impl AppState {
    pub fn new(options: ServerOptions, receiver: BoxedWebhookReceiver, tokens: TokenService) -> Self {
        Self {
            options,
            receiver,
            tokens,
            users: None,
            main_bot_token: None,
        }
    }

    pub fn with_users(mut self, users: UserRepository) -> Self {
        self.users = Some(users);
        self
    }

    pub fn with_main_bot_token(mut self, token: Option<String>) -> Self {
        self.main_bot_token = token;
        self
    }
}

/// State as stored in the router.
pub type SharedState = Arc<AppState>;
