//! # teleserve runtime
//!
//! Everything that turns the library crates into a running service:
//!
//! - [`config`]: layered YAML + environment configuration
//! - [`logging`]: console and rotating file logs
//! - [`BotManager`]: polling and webhook bots
//! - [`Scheduler`]: interval, daily and cron-style jobs, optionally guarded by a Redis lock
//! - [`TeleserveRuntime`]: startup and shutdown in dependency order
//!
//! ```ignore
//! use teleserve_runtime::{ConfigLoader, TeleserveRuntime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = ConfigLoader::new().load()?.extract()?;
//!     TeleserveRuntime::new(settings).run().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod runtime;
pub mod scheduler;
pub mod sync;

pub use bot::BotInstance;
pub use config::{
    BotConfig, BotMode, ConfigLoader, Environment, Layer, LayeredConfig, Settings,
    load_settings, validate_settings,
};
pub use error::{ConfigError, ConfigResult, RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingGuard, init_logging};
pub use manager::BotManager;
pub use runtime::{RunningApp, TeleserveRuntime, wait_for_shutdown};
pub use scheduler::{
    CronFields, CronSchedule, JobInfo, JobLock, JobOptions, MemoryLock, Scheduler, Trigger,
};
pub use sync::UserSyncMiddleware;
