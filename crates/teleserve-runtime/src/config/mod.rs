//! Configuration for teleserve.
//!
//! Settings are read from YAML files in a config directory, overlaid per
//! environment and then by environment variables. See [`loader`] for the
//! layer order.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Layer, LayeredConfig, load_settings};
pub use schema::{
    BotConfig, BotMode, DEFAULT_SECRET_KEY, DatabaseConfig, Environment, LogConfig, LogFormat,
    RedisConfig, SchedulerConfig, ServerConfig, Settings, SnowflakeConfig, ThrottleConfig,
};
pub use validation::validate_settings;
