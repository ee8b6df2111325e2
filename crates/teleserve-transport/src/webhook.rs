//! `POST /tg-bot/webhook/{bot_name}`.
//!
//! ```text
//! unknown bot / polling bot        → 404
//! secret configured, header wrong  → 401
//! body is not an Update            → 400
//! otherwise                        → update fed to the bot, 200
//! ```

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde_json::{Value, json};
use teleserve_core::{Update, WebhookTarget};
use tracing::{debug, warn};

use crate::error::{HttpError, HttpResult};
use crate::state::SharedState;

/// Header Telegram uses to echo the webhook secret token.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Route path, in axum syntax.
pub const WEBHOOK_ROUTE: &str = "/tg-bot/webhook/{bot_name}";

pub(crate) async fn receive_update(
    State(state): State<SharedState>,
    Path(bot_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResult<Json<Value>> {
    match state.receiver.lookup(&bot_name).await {
        WebhookTarget::NotFound => {
            debug!(bot = %bot_name, "Webhook call for unknown bot");
            return Err(HttpError::NotFound(format!("Bot '{bot_name}' not found")));
        }
        WebhookTarget::Polling => {
            debug!(bot = %bot_name, "Webhook call for polling bot");
            return Err(HttpError::NotFound(format!(
                "Bot '{bot_name}' is not in webhook mode"
            )));
        }
        WebhookTarget::Webhook { secret: Some(expected) } => {
            let provided = headers
                .get(SECRET_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !secrets_match(provided, &expected) {
                warn!(bot = %bot_name, "Webhook secret token mismatch");
                return Err(HttpError::unauthorized("Invalid secret token"));
            }
        }
        WebhookTarget::Webhook { secret: None } => {}
    }

    let update = Update::from_slice(&body)
        .map_err(|e| HttpError::bad_request(format!("Invalid update: {e}")))?;
    let update_id = update.update_id;

    if !state.receiver.feed_update(&bot_name, update).await {
        return Err(HttpError::NotFound(format!("Bot '{bot_name}' not found")));
    }

    debug!(bot = %bot_name, update_id, "Webhook update accepted");
    Ok(Json(json!({ "ok": true })))
}

/// Compares without short-circuiting on the first differing byte.
fn secrets_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
