//! Update middlewares.
//!
//! A middleware sees every update before the matchers do. `before` hooks run
//! in registration order and any of them may stop the update by returning
//! `false`; `after` hooks run in reverse order once the matchers are done,
//! and only for updates that passed every `before` hook.
//!
//! Built-in middlewares:
//!
//! - [`LoggingMiddleware`]: logs who sent each update
//! - [`ThrottlingMiddleware`]: drops updates from users that send too fast

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::context::UpdateContext;

/// A hook around update processing.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Called before the matchers. Return `false` to drop the update.
    async fn before(&self, ctx: &UpdateContext) -> bool;

    /// Called after the matchers ran.
    async fn after(&self, _ctx: &UpdateContext) {}
}

// =============================================================================
// LoggingMiddleware
// =============================================================================

/// Logs the sender of every update at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn before(&self, ctx: &UpdateContext) -> bool {
        if let Some(user) = ctx.user() {
            debug!(
                bot = %ctx.bot_name(),
                user_id = user.id,
                username = %user.username.as_deref().unwrap_or("-"),
                kind = ctx.update().kind(),
                "Update from user"
            );
        }
        true
    }
}

// =============================================================================
// ThrottlingMiddleware
// =============================================================================

/// Default minimum interval between two updates of one user.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(500);

/// Drops updates from a user arriving within `rate_limit` of the last
/// accepted update from the same user.
///
/// Updates without a user are never throttled.
#[derive(Debug)]
pub struct ThrottlingMiddleware {
    rate_limit: Duration,
    last_seen: Mutex<HashMap<i64, Instant>>,
}

impl Default for ThrottlingMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT)
    }
}

impl ThrottlingMiddleware {
    pub fn new(rate_limit: Duration) -> Self {
        Self {
            rate_limit,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the middleware from a rate in seconds, as written in config.
    pub fn from_secs_f64(rate_limit: f64) -> Self {
        Self::new(Duration::from_secs_f64(rate_limit.max(0.0)))
    }

    pub fn rate_limit(&self) -> Duration {
        self.rate_limit
    }

    /// Records an update from `user_id` at `now`. Returns `false` if it is
    /// throttled.
    fn admit(&self, user_id: i64, now: Instant) -> bool {
        let mut last_seen = self.last_seen.lock();
        if let Some(last) = last_seen.get(&user_id)
            && now.saturating_duration_since(*last) < self.rate_limit
        {
            return false;
        }
        last_seen.insert(user_id, now);
        true
    }

    /// Forgets users whose last accepted update is older than the rate limit.
    ///
    /// Returns how many entries were removed.
    pub fn purge_stale(&self) -> usize {
        let now = Instant::now();
        let mut last_seen = self.last_seen.lock();
        let before = last_seen.len();
        last_seen.retain(|_, last| now.saturating_duration_since(*last) < self.rate_limit);
        before - last_seen.len()
    }

    /// Number of users currently tracked.
    pub fn tracked_users(&self) -> usize {
        self.last_seen.lock().len()
    }
}

#[async_trait]
impl Middleware for ThrottlingMiddleware {
    async fn before(&self, ctx: &UpdateContext) -> bool {
        let Some(user) = ctx.user() else {
            return true;
        };
        if self.admit(user.id, Instant::now()) {
            true
        } else {
            debug!(bot = %ctx.bot_name(), user_id = user.id, "Throttled user");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_admits_after_interval() {
        let throttle = ThrottlingMiddleware::new(Duration::from_millis(500));
        let start = Instant::now();

        assert!(throttle.admit(1, start));
        assert!(!throttle.admit(1, start + Duration::from_millis(100)));
        // A different user is independent.
        assert!(throttle.admit(2, start + Duration::from_millis(100)));
        assert!(throttle.admit(1, start + Duration::from_millis(500)));
    }

    #[test]
    fn test_throttled_update_does_not_extend_window() {
        let throttle = ThrottlingMiddleware::new(Duration::from_millis(500));
        let start = Instant::now();

        assert!(throttle.admit(1, start));
        assert!(!throttle.admit(1, start + Duration::from_millis(400)));
        assert!(throttle.admit(1, start + Duration::from_millis(550)));
    }

    #[test]
    fn test_zero_rate_never_throttles() {
        let throttle = ThrottlingMiddleware::from_secs_f64(0.0);
        let now = Instant::now();
        assert!(throttle.admit(1, now));
        assert!(throttle.admit(1, now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_stale() {
        let throttle = ThrottlingMiddleware::new(Duration::from_secs(1));
        throttle.admit(1, Instant::now());
        tokio::time::advance(Duration::from_secs(2)).await;
        throttle.admit(2, Instant::now());

        assert_eq!(throttle.purge_stale(), 1);
        assert_eq!(throttle.tracked_users(), 1);
    }
}
