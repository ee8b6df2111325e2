//! Telegram Bot API client.
//!
//! A thin, typed wrapper over `https://api.telegram.org/bot<token>/<method>`.
//! Every call is a JSON POST; the response envelope is unpacked into either
//! the typed result or an [`ApiError::Telegram`].

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::error::{ApiError, ApiResult};
use crate::types::{ReplyMarkup, Update, User, WebhookInfo};

/// Default Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Parse mode applied to outgoing messages unless overridden.
pub const DEFAULT_PARSE_MODE: &str = "MarkdownV2";

/// Extra seconds allowed on top of the long-poll timeout before the HTTP
/// request itself gives up.
const POLL_GRACE_SECS: u64 = 10;

/// One page of `getUpdates`.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    /// Updates that parsed, in delivery order.
    pub updates: Vec<Update>,
    /// Offset confirming every update in the page, skipped ones included.
    pub next_offset: Option<i64>,
}

/// Bot API response envelope.
#[derive(Debug, serde::Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Options for `sendMessage`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SendMessageOptions {
    /// Overrides the client's default parse mode. `Some("")` sends plain text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<ReplyMarkup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_notification: Option<bool>,
}

impl SendMessageOptions {
    pub fn with_markup(markup: impl Into<ReplyMarkup>) -> Self {
        Self {
            reply_markup: Some(markup.into()),
            ..Default::default()
        }
    }
}

/// Client for a single bot token.
#[derive(Clone)]
pub struct TelegramApi {
    client: Client,
    api_base: String,
    token: String,
    parse_mode: String,
}

impl std::fmt::Debug for TelegramApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramApi")
            .field("api_base", &self.api_base)
            .field("parse_mode", &self.parse_mode)
            .finish_non_exhaustive()
    }
}

impl TelegramApi {
    /// Creates a client against the public Bot API.
    pub fn new(token: impl Into<String>) -> ApiResult<Self> {
        Self::with_base(token, DEFAULT_API_BASE)
    }

    /// Creates a client against a custom Bot API server.
    pub fn with_base(token: impl Into<String>, api_base: impl Into<String>) -> ApiResult<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            parse_mode: DEFAULT_PARSE_MODE.to_string(),
        })
    }

    /// Sets the default parse mode for outgoing messages.
    pub fn with_parse_mode(mut self, parse_mode: impl Into<String>) -> Self {
        self.parse_mode = parse_mode.into();
        self
    }

    /// Returns the default parse mode.
    pub fn parse_mode(&self) -> &str {
        &self.parse_mode
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Calls a Bot API method and decodes its result.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ApiResult<T> {
        self.call_with_timeout(method, params, None).await
    }

    async fn call_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> ApiResult<T> {
        debug!(method = %method, "Calling Telegram Bot API");

        let mut request = self.client.post(self.method_url(method)).json(&params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let body = request.send().await?.bytes().await?;
        trace!(method = %method, len = body.len(), "Received Bot API response");

        let envelope: Envelope = serde_json::from_slice(&body)?;
        if !envelope.ok {
            return Err(ApiError::Telegram {
                code: envelope.error_code.unwrap_or_default(),
                description: envelope
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
                retry_after: envelope.parameters.and_then(|p| p.retry_after),
            });
        }

        let result = envelope.result.ok_or_else(|| ApiError::MissingResult {
            method: method.to_string(),
        })?;
        Ok(serde_json::from_value(result)?)
    }

    // =========================================================================
    // Methods
    // =========================================================================

    /// `getMe`: returns the bot's own user.
    pub async fn get_me(&self) -> ApiResult<User> {
        self.call("getMe", json!({})).await
    }

    /// `getUpdates` with long polling.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> ApiResult<UpdateBatch> {
        let mut params = json!({ "timeout": timeout_secs });
        if let Some(offset) = offset {
            params["offset"] = json!(offset);
        }
        let raw: Vec<Value> = self
            .call_with_timeout(
                "getUpdates",
                params,
                Some(Duration::from_secs(timeout_secs + POLL_GRACE_SECS)),
            )
            .await?;
        Ok(parse_batch(raw))
    }

    /// `setWebhook`.
    pub async fn set_webhook(
        &self,
        url: &str,
        drop_pending_updates: bool,
        secret_token: Option<&str>,
    ) -> ApiResult<bool> {
        let mut params = json!({
            "url": url,
            "drop_pending_updates": drop_pending_updates,
        });
        if let Some(secret) = secret_token {
            params["secret_token"] = json!(secret);
        }
        self.call("setWebhook", params).await
    }

    /// `deleteWebhook`.
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> ApiResult<bool> {
        self.call(
            "deleteWebhook",
            json!({ "drop_pending_updates": drop_pending_updates }),
        )
        .await
    }

    /// `getWebhookInfo`.
    pub async fn get_webhook_info(&self) -> ApiResult<WebhookInfo> {
        self.call("getWebhookInfo", json!({})).await
    }

    /// `sendMessage`, using the default parse mode unless `options` overrides it.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: SendMessageOptions,
    ) -> ApiResult<Value> {
        let mut params = serde_json::to_value(&options)?;
        params["chat_id"] = json!(chat_id);
        params["text"] = json!(text);
        match options.parse_mode.as_deref() {
            Some("") => {
                if let Some(map) = params.as_object_mut() {
                    map.remove("parse_mode");
                }
            }
            Some(_) => {}
            None => params["parse_mode"] = json!(self.parse_mode),
        }
        self.call("sendMessage", params).await
    }

    /// `answerCallbackQuery`.
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> ApiResult<bool> {
        let mut params = json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            params["text"] = json!(text);
        }
        self.call("answerCallbackQuery", params).await
    }
}

/// Parses each update on its own. An update that does not parse is logged
/// and skipped, but still counts towards the next offset.
fn parse_batch(raw: Vec<Value>) -> UpdateBatch {
    let mut batch = UpdateBatch::default();
    for value in raw {
        let update_id = value.get("update_id").and_then(Value::as_i64);
        if let Some(id) = update_id {
            batch.next_offset = Some(batch.next_offset.map_or(id + 1, |next| next.max(id + 1)));
        }
        match Update::from_value(value) {
            Ok(update) => batch.updates.push(update),
            Err(e) => warn!(update_id, error = %e, "Skipping malformed update"),
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api(server: &MockServer) -> TelegramApi {
        TelegramApi::with_base("123:abc", server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_get_me_unwraps_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"id": 1, "is_bot": true, "first_name": "Test", "username": "test_bot"}
            })))
            .mount(&server)
            .await;

        let me = api(&server).await.get_me().await.unwrap();
        assert!(me.is_bot);
        assert_eq!(me.username.as_deref(), Some("test_bot"));
    }

    #[tokio::test]
    async fn test_error_envelope_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 5",
                "parameters": {"retry_after": 5}
            })))
            .mount(&server)
            .await;

        let err = api(&server)
            .await
            .send_message(1, "hi", SendMessageOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.retry_after(), Some(5));
        assert!(matches!(err, ApiError::Telegram { code: 429, .. }));
    }

    #[tokio::test]
    async fn test_send_message_uses_default_parse_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": 9,
                "text": "hello",
                "parse_mode": "MarkdownV2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        api(&server)
            .await
            .send_message(9, "hello", SendMessageOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_webhook_sends_secret_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/setWebhook"))
            .and(body_partial_json(json!({
                "url": "https://example.com/tg-bot/webhook/main",
                "drop_pending_updates": true,
                "secret_token": "s3cret"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let ok = api(&server)
            .await
            .set_webhook("https://example.com/tg-bot/webhook/main", true, Some("s3cret"))
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_get_updates_parses_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .and(body_partial_json(json!({"offset": 5, "timeout": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 5, "message": {
                        "message_id": 1, "chat": {"id": 1, "type": "private"}, "date": 0, "text": "hi"
                    }}
                ]
            })))
            .mount(&server)
            .await;

        let batch = api(&server).await.get_updates(Some(5), 0).await.unwrap();
        assert_eq!(batch.next_offset, Some(6));
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates[0].update_id, 5);
        assert_eq!(batch.updates[0].raw["message"]["text"], "hi");
    }

    #[test]
    fn test_malformed_update_is_skipped() {
        let batch = parse_batch(vec![
            json!({"update_id": 9, "message": {"message_id": 1, "date": 0}}),
            json!({"update_id": 7, "message": {
                "message_id": 2, "chat": {"id": 1, "type": "private"}, "date": 0
            }}),
            json!({"no_id": true}),
        ]);
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates[0].update_id, 7);
        assert_eq!(batch.next_offset, Some(10));

        let empty = parse_batch(Vec::new());
        assert!(empty.updates.is_empty());
        assert_eq!(empty.next_offset, None);
    }
}
