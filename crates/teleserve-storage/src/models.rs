//! Persisted records and their repositories.
//!
//! Every table carries the same audit columns ([`AuditFields`]). Timestamps
//! are epoch milliseconds in a `BIGINT` column.

use chrono::Utc;
use serde::Serialize;
use sqlx::FromRow;
use teleserve_core::{User, generate_id};
use tracing::debug;

use crate::database::Database;
use crate::error::{StorageError, StorageResult};

/// Longest allowed `remark`, in characters.
pub const REMARK_MAX_LEN: usize = 512;

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Columns shared by every table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct AuditFields {
    pub create_by: Option<i64>,
    pub update_by: Option<i64>,
    pub create_time: i64,
    pub update_time: i64,
    pub remark: Option<String>,
}

impl AuditFields {
    /// Fresh fields stamped with `now`.
    pub fn stamped(now: i64) -> Self {
        Self {
            create_by: None,
            update_by: None,
            create_time: now,
            update_time: now,
            remark: None,
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if let Some(remark) = &self.remark
            && remark.chars().count() > REMARK_MAX_LEN
        {
            return Err(StorageError::invalid(format!(
                "remark longer than {REMARK_MAX_LEN} characters"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Users
// =============================================================================

/// A Telegram user known to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub audit: AuditFields,
}

const USER_COLUMNS: &str =
    "id, telegram_id, username, first_name, create_by, update_by, create_time, update_time, remark";

/// Queries over the `users` table.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: i64) -> StorageResult<Option<UserRecord>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = {}",
            self.db.dialect().placeholder(1)
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(record)
    }

    pub async fn find_by_telegram_id(&self, telegram_id: i64) -> StorageResult<Option<UserRecord>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE telegram_id = {}",
            self.db.dialect().placeholder(1)
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(telegram_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(record)
    }

    /// Inserts the user, or refreshes `username` and `first_name` if the
    /// Telegram id is already known.
    pub async fn upsert_telegram_user(&self, user: &User) -> StorageResult<UserRecord> {
        if let Some(existing) = self.find_by_telegram_id(user.id).await? {
            return self.refresh(existing, user).await;
        }

        match self.insert(user).await {
            Ok(record) => Ok(record),
            // Lost a race with a concurrent insert.
            Err(err) if err.is_unique_violation() => {
                let existing = self
                    .find_by_telegram_id(user.id)
                    .await?
                    .ok_or(err)?;
                self.refresh(existing, user).await
            }
            Err(err) => Err(err),
        }
    }

    async fn insert(&self, user: &User) -> StorageResult<UserRecord> {
        let record = UserRecord {
            id: i64::try_from(generate_id()?)
                .map_err(|e| StorageError::invalid(e.to_string()))?,
            telegram_id: user.id,
            username: user.username.clone(),
            first_name: Some(user.first_name.clone()),
            audit: AuditFields::stamped(now_millis()),
        };
        record.audit.validate()?;

        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ({})",
            self.db.dialect().placeholders(1, 9)
        );
        sqlx::query(&sql)
            .bind(record.id)
            .bind(record.telegram_id)
            .bind(record.username.clone())
            .bind(record.first_name.clone())
            .bind(record.audit.create_by)
            .bind(record.audit.update_by)
            .bind(record.audit.create_time)
            .bind(record.audit.update_time)
            .bind(record.audit.remark.clone())
            .execute(self.db.pool())
            .await?;

        debug!(id = record.id, telegram_id = record.telegram_id, "User created");
        Ok(record)
    }

    async fn refresh(&self, mut record: UserRecord, user: &User) -> StorageResult<UserRecord> {
        record.username = user.username.clone();
        record.first_name = Some(user.first_name.clone());
        record.audit.update_time = now_millis().max(record.audit.update_time);

        let dialect = self.db.dialect();
        let sql = format!(
            "UPDATE users SET username = {}, first_name = {}, update_time = {} WHERE id = {}",
            dialect.placeholder(1),
            dialect.placeholder(2),
            dialect.placeholder(3),
            dialect.placeholder(4)
        );
        sqlx::query(&sql)
            .bind(record.username.clone())
            .bind(record.first_name.clone())
            .bind(record.audit.update_time)
            .bind(record.id)
            .execute(self.db.pool())
            .await?;

        Ok(record)
    }
}
