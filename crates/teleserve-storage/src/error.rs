//! Storage error types.

use teleserve_core::SnowflakeError;
use thiserror::Error;

/// Errors raised by the database, migration and cache layers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A query or pool operation failed. Pool acquire timeouts land here too.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// The cache was used after [`Cache::close`](crate::Cache::close).
    #[error("cache connection is closed")]
    CacheClosed,

    /// `PING` answered with something other than `PONG`.
    #[error("unexpected ping reply: {0}")]
    Ping(String),

    #[error("unsupported database url scheme: {0}")]
    UnsupportedUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("id generation failed: {0}")]
    Id(#[from] SnowflakeError),

    /// A record failed validation before being written.
    #[error("invalid record: {0}")]
    Invalid(String),
}

impl StorageError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Whether the error is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(err)) => err.is_unique_violation(),
            _ => false,
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
