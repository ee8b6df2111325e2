//! Configuration loader using figment.
//!
//! Configuration is an explicit, ordered stack of layers. Later layers win
//! per key; maps are deep-merged, lists and scalars are replaced whole.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. `base.config.yml`
//! 3. `{env}.config.yml`, where `env` comes from `APP_ENV` (default `dev`)
//! 4. Environment variables (`APP_*`)
//! 5. `SECRET_KEY`, `DATABASE_URL`, `REDIS_URL`
//! 6. Programmatic overrides
//! 7. `env` itself
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `APP_` prefix with `__` as separator:
//!
//! - `APP_LOG__LEVEL=DEBUG` → `log.level = "DEBUG"`
//! - `APP_SERVER__PORT=9000` → `server.port = 9000`
//! - `APP_DATABASE__ECHO=true` → `database.echo = true`
//!
//! # Example
//!
//! ```rust,ignore
//! use teleserve_runtime::config::ConfigLoader;
//!
//! let layered = ConfigLoader::new()
//!     .search_path("./config")
//!     .set("server.port", 9000)
//!     .load()?;
//! let settings = layered.extract()?;
//! assert_eq!(layered.source_of("server.port").unwrap().as_str(), "overrides");
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::ConfigResult;
use super::schema::{Environment, Settings};
use super::validation::validate_settings;

/// Shared base file name.
pub const BASE_FILE: &str = "base.config.yml";

/// Prefix of variables mapped onto arbitrary keys.
pub const ENV_PREFIX: &str = "APP_";

/// Variable selecting the environment overlay.
pub const ENV_SELECTOR: &str = "APP_ENV";

/// Directory under the user config dir searched for files.
pub const CONFIG_DIR_NAME: &str = "teleserve";

/// One source in the configuration stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Defaults,
    BaseFile,
    EnvironmentFile,
    PrefixedEnv,
    WellKnownEnv,
    Overrides,
    Environment,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Defaults => "defaults",
            Self::BaseFile => "base file",
            Self::EnvironmentFile => "environment file",
            Self::PrefixedEnv => "APP_* variables",
            Self::WellKnownEnv => "SECRET_KEY/DATABASE_URL/REDIS_URL",
            Self::Overrides => "overrides",
            Self::Environment => "APP_ENV",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LayeredConfig
// =============================================================================

/// The loaded layer stack.
///
/// Keeps every layer so that [`source_of`](Self::source_of) can tell which
/// one supplied a key.
pub struct LayeredConfig {
    env: Environment,
    files: Vec<PathBuf>,
    layers: Vec<(Layer, Figment)>,
    figment: Figment,
}

impl LayeredConfig {
    /// The selected environment.
    pub fn env(&self) -> Environment {
        self.env
    }

    /// Files that were found and loaded, in layer order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// The merged figment.
    pub fn figment(&self) -> &Figment {
        &self.figment
    }

    /// Deserializes and validates the merged configuration.
    pub fn extract(&self) -> ConfigResult<Settings> {
        let settings: Settings = self.figment.extract()?;
        validate_settings(&settings)?;

        debug!(
            env = %settings.env,
            bots = settings.bots.len(),
            log_level = %settings.log.level,
            "Configuration loaded successfully"
        );
        Ok(settings)
    }

    /// The highest layer that sets `key` (dotted path, e.g. `log.level`).
    pub fn source_of(&self, key: &str) -> Option<Layer> {
        self.layers
            .iter()
            .rev()
            .find(|(_, figment)| figment.find_value(key).is_ok())
            .map(|(layer, _)| *layer)
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader with figment-based multi-source support.
///
/// # Example
///
/// ```rust,ignore
/// let settings = ConfigLoader::new()
///     .environment(Environment::Test)
///     .load()?
///     .extract()?;
/// ```
pub struct ConfigLoader {
    /// Search paths for configuration files.
    search_paths: Vec<PathBuf>,
    /// Environment, when not taken from `APP_ENV`.
    env: Option<Environment>,
    /// Programmatic overrides (layer 6).
    overrides: Figment,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
            env: None,
            overrides: Figment::new(),
        }
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Uses `env` instead of reading `APP_ENV`.
    pub fn environment(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    /// Sets `key` (dotted path) above files and environment variables.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Builds the layer stack.
    pub fn load(self) -> ConfigResult<LayeredConfig> {
        let env = match self.env {
            Some(env) => env,
            None => match std::env::var(ENV_SELECTOR) {
                Ok(value) if !value.trim().is_empty() => value.parse()?,
                _ => Environment::default(),
            },
        };

        let mut layers = vec![(
            Layer::Defaults,
            Figment::from(Serialized::defaults(Settings::default())),
        )];
        let mut files = Vec::new();

        match self.resolve_dir(env) {
            Some(dir) => {
                let candidates = [
                    (Layer::BaseFile, dir.join(BASE_FILE)),
                    (Layer::EnvironmentFile, dir.join(env.file_name())),
                ];
                for (layer, path) in candidates {
                    if path.is_file() {
                        info!(path = %path.display(), "Loading configuration file");
                        layers.push((layer, Figment::from(Yaml::file(&path))));
                        files.push(path);
                    } else {
                        info!(path = %path.display(), "Configuration file not found, skipping");
                    }
                }
            }
            None => warn!("No configuration file found, using defaults"),
        }

        layers.push((
            Layer::PrefixedEnv,
            Figment::from(Env::prefixed(ENV_PREFIX).ignore(&["ENV"]).split("__")),
        ));
        layers.push((Layer::WellKnownEnv, well_known_env()));
        layers.push((Layer::Overrides, self.overrides));
        layers.push((
            Layer::Environment,
            Figment::from(Serialized::default("env", env)),
        ));

        let figment = layers
            .iter()
            .fold(Figment::new(), |merged, (_, layer)| merged.merge(layer.clone()));

        Ok(LayeredConfig {
            env,
            files,
            layers,
            figment,
        })
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            let mut paths = Vec::new();
            if let Ok(cwd) = std::env::current_dir() {
                paths.push(cwd);
            }
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join(CONFIG_DIR_NAME));
            }
            paths
        } else {
            self.search_paths.clone()
        }
    }

    /// The first search path holding the base file or the overlay.
    fn resolve_dir(&self, env: Environment) -> Option<PathBuf> {
        self.resolve_search_paths().into_iter().find(|dir| {
            dir.join(BASE_FILE).is_file() || dir.join(env.file_name()).is_file()
        })
    }
}

/// Plain variables mapped onto their keys.
const WELL_KNOWN_VARS: [(&str, &str); 3] = [
    ("SECRET_KEY", "secret_key"),
    ("DATABASE_URL", "database.url"),
    ("REDIS_URL", "redis.url"),
];

/// `SECRET_KEY`, `DATABASE_URL` and `REDIS_URL`, always taken as strings.
///
/// `Env` would parse `SECRET_KEY=1234` into an integer, which then fails to
/// extract into a string field.
fn well_known_env() -> Figment {
    WELL_KNOWN_VARS
        .iter()
        .fold(Figment::new(), |figment, (var, key)| match std::env::var(var) {
            Ok(value) => figment.merge(Serialized::default(key, value)),
            Err(_) => figment,
        })
}

/// Loads, merges and validates settings from the default locations.
pub fn load_settings() -> ConfigResult<Settings> {
    ConfigLoader::new().load()?.extract()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::config::schema::BotMode;
    use figment::Jail;

    const BASE: &str = r#"
app_name: base-app
log:
  level: INFO
  rotation: "10 MB"
database:
  url: "sqlite::memory:"
  pool_size: 5
bots:
  - name: main
    token: "1:main"
  - name: notify
    token: "2:notify"
"#;

    fn load(jail: &Jail) -> Result<LayeredConfig, figment::Error> {
        ConfigLoader::new()
            .search_path(jail.directory())
            .load()
            .map_err(|e| e.to_string().into())
    }

    fn extract(layered: &LayeredConfig) -> Result<Settings, figment::Error> {
        layered.extract().map_err(|e| e.to_string().into())
    }

    #[test]
    fn test_missing_files_use_defaults() {
        Jail::expect_with(|jail| {
            let layered = load(jail)?;
            assert!(layered.files().is_empty());
            let settings = extract(&layered)?;
            assert_eq!(settings.app_name, "teleserve");
            assert_eq!(settings.env, Environment::Dev);
            assert_eq!(layered.source_of("app_name"), Some(Layer::Defaults));
            Ok(())
        });
    }

    #[test]
    fn test_overlay_per_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(BASE_FILE, BASE)?;
            jail.create_file("dev.config.yml", "app_name: dev-app\n")?;
            jail.create_file("test.config.yml", "log:\n  level: DEBUG\n")?;
            jail.create_file(
                "prod.config.yml",
                "secret_key: prod-secret\ndatabase:\n  pool_size: 50\n",
            )?;

            for env in ["dev", "test", "prod"] {
                jail.set_env(ENV_SELECTOR, env);
                let layered = load(jail)?;
                let settings = extract(&layered)?;
                assert_eq!(settings.env.as_str(), env);
                assert_eq!(layered.files().len(), 2);

                match env {
                    "dev" => {
                        assert_eq!(settings.app_name, "dev-app");
                        assert_eq!(layered.source_of("app_name"), Some(Layer::EnvironmentFile));
                        assert_eq!(settings.log.level, "INFO");
                    }
                    "test" => {
                        assert_eq!(settings.app_name, "base-app");
                        assert_eq!(layered.source_of("app_name"), Some(Layer::BaseFile));
                        assert_eq!(settings.log.level, "DEBUG");
                        // Siblings of an overlaid key survive the deep merge.
                        assert_eq!(settings.log.rotation, "10 MB");
                    }
                    _ => {
                        assert_eq!(settings.database.pool_size, 50);
                        assert_eq!(settings.database.url, "sqlite::memory:");
                        assert!(!settings.docs_enabled());
                    }
                }
            }
            Ok(())
        });
    }

    #[test]
    fn test_lists_are_replaced() {
        Jail::expect_with(|jail| {
            jail.create_file(BASE_FILE, BASE)?;
            jail.create_file(
                "dev.config.yml",
                "bots:\n  - name: solo\n    token: \"3:solo\"\n    mode: dev\n",
            )?;
            let settings = extract(&load(jail)?)?;
            assert_eq!(settings.bots.len(), 1);
            assert_eq!(settings.main_bot().map(|b| b.name.as_str()), Some("solo"));
            assert_eq!(settings.bots[0].mode, BotMode::Dev);
            Ok(())
        });
    }

    #[test]
    fn test_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(BASE_FILE, BASE)?;
            jail.create_file("dev.config.yml", "log:\n  level: WARNING\n")?;
            jail.set_env("APP_LOG__LEVEL", "ERROR");
            jail.set_env("APP_SERVER__PORT", "9100");
            jail.set_env("APP_SECRET_KEY", "from-prefixed");
            jail.set_env("SECRET_KEY", "from-well-known");
            jail.set_env("DATABASE_URL", "postgres://db/app");

            let layered = ConfigLoader::new()
                .search_path(jail.directory())
                .set("server.port", 9200)
                .load()
                .map_err(|e| figment::Error::from(e.to_string()))?;
            let settings = extract(&layered)?;

            assert_eq!(settings.log.level, "ERROR");
            assert_eq!(layered.source_of("log.level"), Some(Layer::PrefixedEnv));
            assert_eq!(settings.secret_key, "from-well-known");
            assert_eq!(layered.source_of("secret_key"), Some(Layer::WellKnownEnv));
            assert_eq!(settings.database.url, "postgres://db/app");
            assert_eq!(settings.database.pool_size, 5);
            assert_eq!(settings.server.port, 9200);
            assert_eq!(layered.source_of("server.port"), Some(Layer::Overrides));
            Ok(())
        });
    }

    #[test]
    fn test_numeric_well_known_values_stay_strings() {
        Jail::expect_with(|jail| {
            jail.set_env("SECRET_KEY", "1234567890");
            jail.set_env("REDIS_URL", "redis://cache:6379/1");
            let layered = load(jail)?;
            let settings = extract(&layered)?;
            assert_eq!(settings.secret_key, "1234567890");
            assert_eq!(settings.redis.url, "redis://cache:6379/1");
            assert_eq!(layered.source_of("secret_key"), Some(Layer::WellKnownEnv));
            assert_eq!(layered.source_of("redis.url"), Some(Layer::WellKnownEnv));
            assert_eq!(layered.source_of("database.url"), Some(Layer::Defaults));
            Ok(())
        });
    }

    #[test]
    fn test_shipped_files_load_in_every_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("SECRET_KEY", "shipped-files-secret");
            let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
            for env in [Environment::Dev, Environment::Test, Environment::Prod] {
                let layered = ConfigLoader::new()
                    .search_path(&root)
                    .environment(env)
                    .load()
                    .map_err(|e| figment::Error::from(e.to_string()))?;
                let settings = extract(&layered)?;
                assert_eq!(settings.env, env);
                assert_eq!(layered.files().len(), 2, "{env}");
                if env == Environment::Test {
                    assert_eq!(settings.database.url, "sqlite::memory:");
                    assert_eq!(layered.source_of("database.url"), Some(Layer::EnvironmentFile));
                }
            }
            Ok(())
        });
    }

    #[test]
    fn test_env_layer_wins_over_files() {
        Jail::expect_with(|jail| {
            jail.create_file(BASE_FILE, "env: prod\n")?;
            jail.set_env(ENV_SELECTOR, "test");
            let layered = load(jail)?;
            assert_eq!(extract(&layered)?.env, Environment::Test);
            assert_eq!(layered.source_of("env"), Some(Layer::Environment));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_environment() {
        Jail::expect_with(|jail| {
            jail.set_env(ENV_SELECTOR, "staging");
            let result = ConfigLoader::new().search_path(jail.directory()).load();
            assert!(matches!(result, Err(ConfigError::UnknownEnvironment(_))));
            Ok(())
        });
    }

    #[test]
    fn test_webhook_bot_requires_url() {
        Jail::expect_with(|jail| {
            jail.create_file(
                BASE_FILE,
                "bots:\n  - name: hook\n    token: \"1:x\"\n    mode: webhook\n",
            )?;
            assert!(matches!(
                load(jail)?.extract(),
                Err(ConfigError::MissingField { .. })
            ));

            jail.create_file(
                "dev.config.yml",
                "bots:\n  - name: hook\n    token: \"1:x\"\n    mode: webhook\n    webhook_url: https://example.com/tg-bot/webhook/hook\n",
            )?;
            let settings = extract(&load(jail)?)?;
            assert_eq!(
                settings.bots[0].webhook_url(),
                Some("https://example.com/tg-bot/webhook/hook")
            );
            Ok(())
        });
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        Jail::expect_with(|jail| {
            jail.create_file(BASE_FILE, "server:\n  port: [not, a, port]\n")?;
            assert!(matches!(
                load(jail)?.extract(),
                Err(ConfigError::ParseError(_))
            ));
            Ok(())
        });
    }
}
