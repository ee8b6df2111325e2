//! Redis cache connection.

use std::time::Duration;

use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionInfo, IntoConnectionInfo};
use tracing::info;

use crate::database::redact_url;
use crate::error::{StorageError, StorageResult};

/// Builds connection info from `url`, overriding its password when one is
/// configured separately.
pub fn connection_info(url: &str, password: Option<&str>) -> StorageResult<ConnectionInfo> {
    let mut info = url.into_connection_info()?;
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        info.redis.password = Some(password.to_string());
    }
    Ok(info)
}

/// Shared Redis connection.
///
/// The underlying multiplexed connection is cloned for every command, so a
/// `Cache` can be used from many tasks at once.
pub struct Cache {
    conn: RwLock<Option<MultiplexedConnection>>,
}

impl Cache {
    /// Connects and checks the server with `PING`.
    pub async fn connect(url: &str, password: Option<&str>) -> StorageResult<Self> {
        let client = Client::open(connection_info(url, password)?)?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(StorageError::Ping(pong));
        }

        info!(url = %redact_url(url), "Redis connection established");
        Ok(Self {
            conn: RwLock::new(Some(conn)),
        })
    }

    /// A cache with no connection, for deployments and tests that run
    /// without Redis. Every command fails with [`StorageError::CacheClosed`].
    pub fn disconnected() -> Self {
        Self {
            conn: RwLock::new(None),
        }
    }

    /// A handle to the shared connection.
    pub fn conn(&self) -> StorageResult<MultiplexedConnection> {
        self.conn.read().clone().ok_or(StorageError::CacheClosed)
    }

    pub async fn ping(&self) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StorageError::Ping(pong))
        }
    }

    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let mut conn = self.conn()?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Stores `value`, expiring after `ttl` when given.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        let mut conn = self.conn()?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    /// Deletes `key`. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// Drops the connection. Later calls fail with [`StorageError::CacheClosed`].
    pub fn close(&self) {
        if self.conn.write().take().is_some() {
            info!("Redis client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_injected() {
        let info = connection_info("redis://localhost:6379/2", Some("s3cret")).unwrap();
        assert_eq!(info.redis.password.as_deref(), Some("s3cret"));
        assert_eq!(info.redis.db, 2);
    }

    #[test]
    fn test_url_password_kept_without_override() {
        let info = connection_info("redis://:frompath@localhost:6379/0", None).unwrap();
        assert_eq!(info.redis.password.as_deref(), Some("frompath"));

        let info = connection_info("redis://localhost:6379/0", Some("")).unwrap();
        assert!(info.redis.password.is_none());
    }

    #[tokio::test]
    async fn test_disconnected_cache_rejects_commands() {
        let cache = Cache::disconnected();
        assert!(cache.is_closed());
        assert!(matches!(cache.get("k").await, Err(StorageError::CacheClosed)));
        assert!(matches!(cache.ping().await, Err(StorageError::CacheClosed)));
        cache.close();
    }

    #[test]
    fn test_invalid_url() {
        assert!(connection_info("not a url", None).is_err());
    }
}
