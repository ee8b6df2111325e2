//! Redis-backed mutual exclusion across processes.
//!
//! A lock is a key set with `SET NX EX` to a random token. Only the holder
//! of the token may release it; release is a compare-and-delete script so a
//! lock that expired and was taken by someone else is never deleted.

use std::sync::Arc;
use std::time::Duration;

use redis::Script;
use tracing::debug;

use crate::cache::Cache;
use crate::error::StorageResult;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Token-based lock over a [`Cache`].
#[derive(Clone)]
pub struct DistributedLock {
    cache: Arc<Cache>,
}

impl DistributedLock {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    /// Tries to take `key` for `ttl`. Returns the token on success, `None`
    /// when someone else holds it.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>> {
        let token = uuid::Uuid::new_v4().to_string();
        let mut conn = self.cache.conn()?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        if reply.is_some() {
            debug!(key, "Lock acquired");
            Ok(Some(token))
        } else {
            debug!(key, "Lock held elsewhere");
            Ok(None)
        }
    }

    /// Releases `key` if it is still held with `token`.
    pub async fn release(&self, key: &str, token: &str) -> StorageResult<bool> {
        let mut conn = self.cache.conn()?;
        let removed: i64 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }
}
