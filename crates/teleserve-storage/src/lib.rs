//! # teleserve storage
//!
//! Persistence for teleserve:
//!
//! - [`Database`]: sqlx `Any` pool over MySQL, PostgreSQL or SQLite
//! - [`MigrationManager`]: reversible SQL migrations (`up`, `down`, `history`, ...)
//! - [`UserRepository`]: the `users` table
//! - [`Cache`]: Redis multiplexed connection
//! - [`DistributedLock`]: `SET NX EX` lock with token-checked release

pub mod cache;
pub mod database;
pub mod error;
pub mod lock;
pub mod migrate;
pub mod models;

pub use cache::Cache;
pub use database::{Database, DatabaseOptions, Dialect};
pub use error::{StorageError, StorageResult};
pub use lock::DistributedLock;
pub use migrate::{DEFAULT_MIGRATIONS_DIR, MigrationManager, MigrationStatus, ScaffoldedMigration};
pub use models::{AuditFields, UserRecord, UserRepository};
