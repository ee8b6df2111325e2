//! Versioned JSON API mounted under `/api/v1`.

use axum::extract::{FromRequest, Request, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use teleserve_core::security::validate_webapp_init_data;
use teleserve_core::{AccessToken, BotSummary, TokenPair};
use teleserve_storage::UserRecord;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{HttpError, HttpResult};
use crate::state::SharedState;

pub const API_PREFIX: &str = "/api/v1";

/// A JSON body whose rejections use the `{"detail": ...}` envelope.
///
/// Malformed JSON or a wrong content type answers 400; JSON of the wrong
/// shape answers 422.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Body of `POST /auth/webapp`.
#[derive(Debug, Deserialize)]
pub struct WebAppLogin {
    pub init_data: String,
}

/// Body of `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub(crate) fn routes() -> Router<SharedState> {
    Router::new()
        .route("/auth/webapp", post(login_webapp))
        .route("/auth/refresh", post(refresh))
        .route("/users/me", get(current_user))
        .route("/bots", get(list_bots))
}

/// Exchanges Mini App init data for a token pair.
///
/// With a database the token subject is the user's record id; without one
/// it is the Telegram user id.
async fn login_webapp(
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<WebAppLogin>,
) -> HttpResult<Json<TokenPair>> {
    let bot_token = state
        .main_bot_token
        .as_deref()
        .ok_or_else(|| HttpError::Unavailable("No main bot configured".to_string()))?;

    let init = validate_webapp_init_data(&body.init_data, bot_token)?;

    let subject = match &state.users {
        Some(users) => users.upsert_telegram_user(&init.user).await?.id.to_string(),
        None => init.user.id.to_string(),
    };

    info!(telegram_id = init.user.id, "Mini App login");
    let pair = state
        .tokens
        .create_token_pair(&subject)
        .map_err(|e| HttpError::Internal(e.to_string()))?;
    Ok(Json(pair))
}

async fn refresh(
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> HttpResult<Json<AccessToken>> {
    Ok(Json(state.tokens.refresh_access_token(&body.refresh_token)?))
}

async fn current_user(
    State(state): State<SharedState>,
    user: AuthUser,
) -> HttpResult<Json<UserRecord>> {
    let users = state
        .users
        .as_ref()
        .ok_or_else(|| HttpError::Unavailable("No database configured".to_string()))?;
    let id = user
        .user_id
        .parse::<i64>()
        .map_err(|_| HttpError::unauthorized("Invalid token subject"))?;

    users
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| HttpError::NotFound("User not found".to_string()))
}

async fn list_bots(State(state): State<SharedState>, _user: AuthUser) -> Json<Vec<BotSummary>> {
    Json(state.receiver.summaries().await)
}
