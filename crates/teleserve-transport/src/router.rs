//! Route table.
//!
//! ```text
//! GET  /health
//! GET  /docs, /redoc, /openapi.json     (only when docs are enabled)
//! POST /tg-bot/webhook/{bot_name}
//! POST /api/v1/auth/webapp
//! POST /api/v1/auth/refresh
//! GET  /api/v1/users/me                 (bearer)
//! GET  /api/v1/bots                     (bearer)
//! ```

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::debug;

use crate::api::{self, API_PREFIX};
use crate::docs::{self, OPENAPI_ROUTE, REDOC_ROUTE, SWAGGER_ROUTE};
use crate::error::HttpError;
use crate::state::SharedState;
use crate::webhook::{self, WEBHOOK_ROUTE};

/// Builds the application router.
pub fn build_router(state: SharedState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route(WEBHOOK_ROUTE, post(webhook::receive_update))
        .nest(API_PREFIX, api::routes());

    if state.options.docs_enabled {
        router = router
            .route(OPENAPI_ROUTE, get(docs::openapi_json))
            .route(SWAGGER_ROUTE, get(docs::swagger_ui))
            .route(REDOC_ROUTE, get(docs::redoc));
    }

    router
        .fallback(not_found)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> HttpError {
    HttpError::not_found()
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    debug!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "HTTP request"
    );
    response
}
