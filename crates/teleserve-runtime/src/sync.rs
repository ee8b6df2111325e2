//! Records users who send `/start`.

use async_trait::async_trait;
use teleserve_framework::{Middleware, UpdateContext};
use teleserve_storage::UserRepository;
use tracing::{debug, warn};

/// Upserts the sender of `/start` into the `users` table.
///
/// Never drops an update; a failed write is logged and the command still
/// reaches its handler.
#[derive(Debug, Clone)]
pub struct UserSyncMiddleware {
    users: UserRepository,
}

impl UserSyncMiddleware {
    pub fn new(users: UserRepository) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Middleware for UserSyncMiddleware {
    async fn before(&self, ctx: &UpdateContext) -> bool {
        let is_start = ctx.command().is_some_and(|(cmd, _)| cmd == "start");
        if !is_start {
            return true;
        }
        let Some(user) = ctx.user() else {
            return true;
        };

        match self.users.upsert_telegram_user(user).await {
            Ok(record) => debug!(id = record.id, telegram_id = user.id, "User synced"),
            Err(e) => warn!(telegram_id = user.id, error = %e, "Failed to sync user"),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use teleserve_core::{TelegramApi, Update};
    use teleserve_storage::{Database, DatabaseOptions, MigrationManager};

    async fn users() -> UserRepository {
        let _ = teleserve_core::init_snowflake(Some(1));
        let db = Database::connect(&DatabaseOptions::new("sqlite::memory:"))
            .await
            .unwrap();
        let migrations = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
        MigrationManager::new(db.clone(), migrations)
            .await
            .unwrap()
            .up()
            .await
            .unwrap();
        UserRepository::new(db)
    }

    fn ctx(text: &str) -> UpdateContext {
        let update = Update::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "from": {"id": 4242, "first_name": "Grace", "username": "grace"},
                "chat": {"id": 4242, "type": "private"},
                "date": 0,
                "text": text
            }
        }))
        .unwrap();
        let api = Arc::new(TelegramApi::with_base("1:test", "http://127.0.0.1:9").unwrap());
        UpdateContext::new(update, "main", api)
    }

    #[tokio::test]
    async fn test_start_upserts_user() {
        let users = users().await;
        let middleware = UserSyncMiddleware::new(users.clone());

        assert!(middleware.before(&ctx("hello")).await);
        assert!(users.find_by_telegram_id(4242).await.unwrap().is_none());

        assert!(middleware.before(&ctx("/start")).await);
        let record = users.find_by_telegram_id(4242).await.unwrap().unwrap();
        assert_eq!(record.username.as_deref(), Some("grace"));
        assert_eq!(record.first_name.as_deref(), Some("Grace"));
    }
}
