//! Fixtures shared by the router tests.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use parking_lot::Mutex;
use serde_json::Value;
use teleserve_core::security::sign;
use teleserve_core::{BotSummary, TokenService, Update, WebhookReceiver, WebhookTarget};

use crate::router::build_router;
use crate::state::{AppState, ServerOptions, SharedState};
use crate::webhook::SECRET_TOKEN_HEADER;

/// Knows three bots: `poller` (polling), `open` (webhook, no secret) and
/// `secured` (webhook, secret `s3cret`). Records every fed update.
#[derive(Default)]
pub(crate) struct FakeReceiver {
    fed: Mutex<Vec<(String, i64)>>,
}

#[async_trait]
impl WebhookReceiver for FakeReceiver {
    async fn lookup(&self, bot_name: &str) -> WebhookTarget {
        match bot_name {
            "poller" => WebhookTarget::Polling,
            "open" => WebhookTarget::Webhook { secret: None },
            "secured" => WebhookTarget::Webhook {
                secret: Some("s3cret".to_string()),
            },
            _ => WebhookTarget::NotFound,
        }
    }

    async fn feed_update(&self, bot_name: &str, update: Update) -> bool {
        self.fed.lock().push((bot_name.to_string(), update.update_id));
        true
    }

    async fn summaries(&self) -> Vec<BotSummary> {
        ["poller", "open", "secured"]
            .into_iter()
            .map(|name| BotSummary {
                name: name.to_string(),
                mode: if name == "poller" { "polling" } else { "webhook" }.to_string(),
                running: true,
                bot_url: None,
                app_url: None,
            })
            .collect()
    }
}

pub(crate) struct TestApp {
    receiver: Arc<FakeReceiver>,
    state: SharedState,
}

impl TestApp {
    pub const SECRET: &'static str = "test-secret";
    pub const MAIN_BOT_TOKEN: &'static str = "123:main";

    pub fn new() -> Self {
        Self::with_docs(true)
    }

    pub fn with_docs(docs_enabled: bool) -> Self {
        let receiver = Arc::new(FakeReceiver::default());
        let state = AppState::new(
            ServerOptions::new("teleserve-test").with_docs(docs_enabled),
            receiver.clone(),
            TokenService::new(Self::SECRET),
        )
        .with_main_bot_token(Some(Self::MAIN_BOT_TOKEN.to_string()));
        Self {
            receiver,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn router(&self) -> Router {
        build_router(self.state())
    }

    pub fn fed(&self) -> Vec<(String, i64)> {
        self.receiver.fed.lock().clone()
    }
}

pub(crate) fn post_json(uri: &str, body: &str, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(secret) = secret {
        builder = builder.header(SECRET_TOKEN_HEADER, secret);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub(crate) fn get_with_token(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub(crate) async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Init data for user 777, signed for `bot_token` the way Telegram does.
pub(crate) fn signed_init_data(bot_token: &str) -> String {
    let auth_date = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .to_string();
    let user = r#"{"id":777,"first_name":"Ada","username":"ada"}"#;
    let fields = [("auth_date", auth_date.as_str()), ("user", user)];

    let check = fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");
    let secret = hex::decode(sign(b"WebAppData", bot_token.as_bytes())).unwrap();
    let hash = sign(&secret, check.as_bytes());

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in fields {
        serializer.append_pair(k, v);
    }
    serializer.append_pair("hash", &hash);
    serializer.finish()
}
