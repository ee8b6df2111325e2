//! HTTP error types.
//!
//! Every failed request answers with a JSON body `{"detail": "..."}` and
//! the status code of the [`HttpError`] variant.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use teleserve_core::{TokenError, WebAppAuthError};
use teleserve_storage::StorageError;
use thiserror::Error;
use tracing::error;

// =============================================================================
// Request Errors
// =============================================================================

/// An error answered to an HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// A well-formed body that does not match the expected shape.
    #[error("{0}")]
    Unprocessable(String),

    /// A backing service (database, main bot) is not configured.
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl HttpError {
    pub fn not_found() -> Self {
        Self::NotFound("Not Found".to_string())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

impl From<TokenError> for HttpError {
    fn from(err: TokenError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

impl From<WebAppAuthError> for HttpError {
    fn from(err: WebAppAuthError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(_) => Self::Unprocessable(rejection.body_text()),
            _ => Self::BadRequest(rejection.body_text()),
        }
    }
}

impl From<StorageError> for HttpError {
    fn from(err: StorageError) -> Self {
        error!(error = %err, "Storage failure while handling request");
        Self::Internal("Internal Server Error".to_string())
    }
}

/// Result type for request handlers.
pub type HttpResult<T> = Result<T, HttpError>;

// =============================================================================
// Server Errors
// =============================================================================

/// Errors raised while starting or running the server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Result type for server lifecycle operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HttpError::not_found().status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            HttpError::from(TokenError::Expired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            HttpError::from(StorageError::CacheClosed),
            HttpError::Internal("Internal Server Error".to_string())
        );
    }
}
