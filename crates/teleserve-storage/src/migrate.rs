//! Versioned schema migrations.
//!
//! Migrations live in one directory as reversible pairs named
//! `<version>_<slug>.up.sql` / `<version>_<slug>.down.sql`, where the
//! version is a UTC `yyyymmddHHMMSS` timestamp. Applied versions are
//! tracked in sqlx's `_sqlx_migrations` table.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::migrate::{Migrate, Migrator};
use tracing::info;

use crate::database::Database;
use crate::error::StorageResult;

/// Default migrations directory, relative to the working directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// One migration and whether it has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub applied: bool,
}

/// Paths written by [`MigrationManager::scaffold`].
#[derive(Debug, Clone)]
pub struct ScaffoldedMigration {
    pub version: i64,
    pub up: PathBuf,
    pub down: PathBuf,
}

/// Applies and reverts the migrations found in a directory.
pub struct MigrationManager {
    db: Database,
    migrator: Migrator,
}

impl MigrationManager {
    /// Loads every migration under `dir`.
    pub async fn new(db: Database, dir: impl AsRef<Path>) -> StorageResult<Self> {
        let migrator = Migrator::new(dir.as_ref()).await?;
        Ok(Self { db, migrator })
    }

    /// Writes an empty up/down pair for `description` into `dir`.
    pub fn scaffold(dir: impl AsRef<Path>, description: &str) -> StorageResult<ScaffoldedMigration> {
        Self::scaffold_at(dir.as_ref(), description, Utc::now())
    }

    fn scaffold_at(
        dir: &Path,
        description: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<ScaffoldedMigration> {
        let slug = slugify(description);
        if slug.is_empty() {
            return Err(crate::StorageError::invalid(
                "migration description must contain letters or digits",
            ));
        }

        fs::create_dir_all(dir)?;
        let stamp = now.format("%Y%m%d%H%M%S").to_string();
        let version = stamp
            .parse::<i64>()
            .map_err(|e| crate::StorageError::invalid(e.to_string()))?;

        let up = dir.join(format!("{stamp}_{slug}.up.sql"));
        let down = dir.join(format!("{stamp}_{slug}.down.sql"));
        fs::write(&up, format!("-- {description}\n"))?;
        fs::write(&down, format!("-- Revert: {description}\n"))?;

        info!(version, path = %up.display(), "Created migration");
        Ok(ScaffoldedMigration { version, up, down })
    }

    /// Applies every pending migration.
    pub async fn up(&self) -> StorageResult<Vec<i64>> {
        let before = self.applied_versions().await?;
        self.migrator.run(self.db.pool()).await?;
        let after = self.applied_versions().await?;

        let mut applied: Vec<i64> = after.difference(&before).copied().collect();
        applied.sort_unstable();
        info!(count = applied.len(), "Migrations applied");
        Ok(applied)
    }

    /// Reverts down to `target`, exclusive. Without a target only the latest
    /// applied migration is reverted. Returns the new current version.
    pub async fn down(&self, target: Option<i64>) -> StorageResult<Option<i64>> {
        let mut applied: Vec<i64> = self.applied_versions().await?.into_iter().collect();
        applied.sort_unstable();

        let Some(&latest) = applied.last() else {
            info!("No applied migrations to revert");
            return Ok(None);
        };

        let target = match target {
            Some(target) => target,
            None => applied.iter().rev().nth(1).copied().unwrap_or(0),
        };
        if target >= latest {
            return Ok(Some(latest));
        }

        self.migrator.undo(self.db.pool(), target).await?;
        let current = self.current().await?;
        info!(from = latest, to = ?current, "Migrations reverted");
        Ok(current)
    }

    /// Reverts every applied migration.
    pub async fn reset(&self) -> StorageResult<()> {
        self.migrator.undo(self.db.pool(), 0).await?;
        info!("All migrations reverted");
        Ok(())
    }

    /// Every known migration, oldest first, with its applied status.
    pub async fn history(&self) -> StorageResult<Vec<MigrationStatus>> {
        let applied = self.applied_versions().await?;
        Ok(self
            .migrator
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| MigrationStatus {
                version: m.version,
                description: m.description.to_string(),
                applied: applied.contains(&m.version),
            })
            .collect())
    }

    /// Latest applied version.
    pub async fn current(&self) -> StorageResult<Option<i64>> {
        Ok(self.applied_versions().await?.into_iter().max())
    }

    async fn applied_versions(&self) -> StorageResult<HashSet<i64>> {
        let mut conn = self.db.pool().acquire().await?;
        conn.ensure_migrations_table().await?;
        let applied = conn.list_applied_migrations().await?;
        Ok(applied.into_iter().map(|m| m.version).collect())
    }
}

/// Lowercases and joins alphanumeric runs with `_`.
fn slugify(description: &str) -> String {
    description
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseOptions;
    use chrono::TimeZone;

    fn migrations_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations")
    }

    async fn memory_db() -> Database {
        Database::connect(&DatabaseOptions::new("sqlite::memory:"))
            .await
            .unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add users table!"), "add_users_table");
        assert_eq!(slugify("  "), "");
    }

    #[test]
    fn test_scaffold_writes_pair() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let created = MigrationManager::scaffold_at(dir.path(), "Create orders", now).unwrap();

        assert_eq!(created.version, 20250304050607);
        assert!(created.up.ends_with("20250304050607_create_orders.up.sql"));
        assert!(created.down.exists());
        assert!(
            fs::read_to_string(&created.up)
                .unwrap()
                .contains("Create orders")
        );
    }

    #[test]
    fn test_scaffold_rejects_empty_description() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MigrationManager::scaffold(dir.path(), "!!!").is_err());
    }

    #[tokio::test]
    async fn test_up_history_down() {
        let db = memory_db().await;
        let manager = MigrationManager::new(db.clone(), migrations_dir())
            .await
            .unwrap();

        assert_eq!(manager.current().await.unwrap(), None);
        let history = manager.history().await.unwrap();
        assert!(!history.is_empty());
        assert!(history.iter().all(|m| !m.applied));

        let applied = manager.up().await.unwrap();
        assert_eq!(applied.len(), history.len());
        assert!(manager.history().await.unwrap().iter().all(|m| m.applied));

        // Running again is a no-op.
        assert!(manager.up().await.unwrap().is_empty());

        manager.down(None).await.unwrap();
        assert_eq!(
            manager.current().await.unwrap(),
            history.iter().rev().nth(1).map(|m| m.version)
        );

        manager.up().await.unwrap();
        manager.reset().await.unwrap();
        assert_eq!(manager.current().await.unwrap(), None);
    }
}
