//! Unified error types for the teleserve core.
//!
//! Each utility in this crate has its own error enum so that callers can
//! match on exactly the failures that utility produces.

use thiserror::Error;

// =============================================================================
// API Errors
// =============================================================================

/// Errors returned by the Telegram Bot API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP request itself failed (connect, TLS, timeout, body read).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Telegram answered with `ok: false`.
    #[error("telegram error ({code}): {description}")]
    Telegram {
        code: i64,
        description: String,
        /// Seconds to wait before retrying, set on flood control errors.
        retry_after: Option<u64>,
    },

    /// The response envelope could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The envelope said `ok: true` but carried no result.
    #[error("telegram response for '{method}' had no result")]
    MissingResult { method: String },
}

impl ApiError {
    /// Returns the flood-control delay, if Telegram asked for one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Telegram { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Snowflake Errors
// =============================================================================

/// Errors produced by the snowflake ID generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnowflakeError {
    #[error("machine id {0} out of range (0-15)")]
    InvalidMachineId(u16),

    #[error("clock moved backwards, refusing to generate id for {0} milliseconds")]
    ClockMovedBackwards(u64),

    #[error("snowflake generator not initialized, call init_snowflake() first")]
    NotInitialized,

    #[error("snowflake generator already initialized")]
    AlreadyInitialized,
}

// =============================================================================
// Token Errors
// =============================================================================

/// Errors produced while issuing or verifying signed tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token carries no user id")]
    MissingUserId,

    #[error("wrong token type: expected {expected}, got {actual}")]
    WrongType {
        expected: &'static str,
        actual: String,
    },
}

// =============================================================================
// WebApp Auth Errors
// =============================================================================

/// Errors produced while validating Telegram Mini App init data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebAppAuthError {
    #[error("missing '{0}' parameter")]
    MissingField(&'static str),

    #[error("init data hash does not match")]
    HashMismatch,

    #[error("init data is too old ({0} seconds)")]
    Expired(i64),

    #[error("invalid user payload: {0}")]
    InvalidUser(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for Bot API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for snowflake operations.
pub type SnowflakeResult<T> = Result<T, SnowflakeError>;

/// Result type for token operations.
pub type TokenResult<T> = Result<T, TokenError>;
