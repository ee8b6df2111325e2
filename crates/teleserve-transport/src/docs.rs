//! API documentation: `/openapi.json`, `/docs` (Swagger UI), `/redoc`.
//!
//! The OpenAPI document is built by hand from the routes this crate serves.

use axum::Json;
use axum::extract::State;
use axum::response::Html;
use serde_json::{Value, json};

use crate::state::{ServerOptions, SharedState};

pub const OPENAPI_ROUTE: &str = "/openapi.json";
pub const SWAGGER_ROUTE: &str = "/docs";
pub const REDOC_ROUTE: &str = "/redoc";

pub(crate) async fn openapi_json(State(state): State<SharedState>) -> Json<Value> {
    Json(openapi_document(&state.options))
}

pub(crate) async fn swagger_ui(State(state): State<SharedState>) -> Html<String> {
    Html(format!(
        r##"<!DOCTYPE html>
<html>
<head>
<title>{title} - Swagger UI</title>
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
<script>SwaggerUIBundle({{ url: "{OPENAPI_ROUTE}", dom_id: "#swagger-ui" }});</script>
</body>
</html>"##,
        title = html_escape(&state.options.app_name)
    ))
}

pub(crate) async fn redoc(State(state): State<SharedState>) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>{title} - ReDoc</title>
</head>
<body>
<redoc spec-url="{OPENAPI_ROUTE}"></redoc>
<script src="https://cdn.jsdelivr.net/npm/redoc@2/bundles/redoc.standalone.js"></script>
</body>
</html>"#,
        title = html_escape(&state.options.app_name)
    ))
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// The OpenAPI 3.1 document describing the server.
pub fn openapi_document(options: &ServerOptions) -> Value {
    let mut paths = serde_json::Map::new();
    paths.insert("/health".into(), health_path());
    paths.insert("/tg-bot/webhook/{bot_name}".into(), webhook_path());
    paths.insert(
        "/api/v1/auth/webapp".into(),
        json_post(
            "Log in with Mini App init data",
            "init_data",
            "Token pair",
            "Invalid init data",
        ),
    );
    paths.insert(
        "/api/v1/auth/refresh".into(),
        json_post(
            "Exchange a refresh token for an access token",
            "refresh_token",
            "Access token",
            "Invalid refresh token",
        ),
    );
    paths.insert("/api/v1/users/me".into(), bearer_get("Current user", "User record"));
    paths.insert("/api/v1/bots".into(), bearer_get("Managed bots", "Bot list"));

    json!({
        "openapi": "3.1.0",
        "info": { "title": options.app_name, "version": options.version },
        "paths": paths,
        "components": {
            "securitySchemes": {
                "bearer": { "type": "http", "scheme": "bearer", "bearerFormat": "JWT" }
            },
            "schemas": {
                "Error": {
                    "type": "object",
                    "properties": { "detail": { "type": "string" } }
                }
            }
        }
    })
}

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": { "schema": { "$ref": "#/components/schemas/Error" } }
        }
    })
}

fn health_path() -> Value {
    json!({
        "get": {
            "summary": "Liveness probe",
            "responses": { "200": { "description": "Service is up" } }
        }
    })
}

fn webhook_path() -> Value {
    let parameters = json!([
        { "name": "bot_name", "in": "path", "required": true, "schema": { "type": "string" } },
        {
            "name": "X-Telegram-Bot-Api-Secret-Token",
            "in": "header",
            "required": false,
            "schema": { "type": "string" }
        }
    ]);
    json!({
        "post": {
            "summary": "Receive a Telegram update",
            "parameters": parameters,
            "requestBody": {
                "required": true,
                "content": { "application/json": { "schema": { "type": "object" } } }
            },
            "responses": {
                "200": { "description": "Update accepted" },
                "400": error_response("Malformed update"),
                "401": error_response("Secret token mismatch"),
                "404": error_response("Unknown or polling bot")
            }
        }
    })
}

fn json_post(summary: &str, field: &str, ok: &str, unauthorized: &str) -> Value {
    let schema = json!({
        "type": "object",
        "required": [field],
        "properties": { field: { "type": "string" } }
    });
    json!({
        "post": {
            "summary": summary,
            "requestBody": {
                "required": true,
                "content": { "application/json": { "schema": schema } }
            },
            "responses": {
                "200": { "description": ok },
                "401": error_response(unauthorized)
            }
        }
    })
}

fn bearer_get(summary: &str, ok: &str) -> Value {
    json!({
        "get": {
            "summary": summary,
            "security": [{ "bearer": [] }],
            "responses": {
                "200": { "description": ok },
                "401": error_response("Not authenticated")
            }
        }
    })
}
