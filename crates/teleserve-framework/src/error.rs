//! Error types for the teleserve framework.

use teleserve_core::ApiError;
use thiserror::Error;

/// Errors a handler can return.
///
/// The dispatcher logs these and moves on; a failing handler never stops
/// other matchers from seeing the update.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A Bot API call made by the handler failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The update has no chat to reply into.
    #[error("update {0} has no chat to reply to")]
    NoChat(i64),

    /// The update is not a callback query.
    #[error("update {0} is not a callback query")]
    NotCallback(i64),

    /// Custom handler error.
    #[error("{0}")]
    Custom(String),
}

impl HandlerError {
    /// Creates a custom handler error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for handlers.
pub type HandlerResult = Result<(), HandlerError>;
