//! Runtime error types.

use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A Telegram API call made by the runtime failed.
    #[error("Telegram API error: {0}")]
    Api(#[from] teleserve_core::ApiError),

    #[error(transparent)]
    Storage(#[from] teleserve_storage::StorageError),

    #[error(transparent)]
    Transport(#[from] teleserve_transport::TransportError),

    #[error("Snowflake error: {0}")]
    Snowflake(#[from] teleserve_core::SnowflakeError),

    /// Log files could not be opened.
    #[error("Logging setup failed: {0}")]
    Logging(#[from] std::io::Error),

    /// A webhook bot was started without a webhook URL.
    #[error("Bot '{0}': webhook_url is required for webhook mode")]
    MissingWebhookUrl(String),

    /// A scheduler job was given an unusable trigger.
    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
