//! Configuration validation utilities.

use std::collections::HashSet;

use teleserve_core::snowflake::MAX_MACHINE_ID;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, DEFAULT_SECRET_KEY, Environment, Settings};
use crate::logging::{Rotation, parse_retention};

/// Level names accepted in `log.level`, case-insensitive.
pub const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Validates the entire configuration.
pub fn validate_settings(settings: &Settings) -> ConfigResult<()> {
    validate_secret(settings)?;
    validate_log(settings)?;
    validate_database(settings)?;
    validate_bots(&settings.bots)?;
    validate_misc(settings)?;
    Ok(())
}

fn validate_secret(settings: &Settings) -> ConfigResult<()> {
    if settings.secret_key.is_empty() {
        return Err(ConfigError::missing_field("secret_key"));
    }
    if settings.env == Environment::Prod && settings.secret_key == DEFAULT_SECRET_KEY {
        return Err(ConfigError::validation(
            "secret_key must be changed from the default in prod",
        ));
    }
    Ok(())
}

fn validate_log(settings: &Settings) -> ConfigResult<()> {
    let level = settings.log.level.to_uppercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::validation(format!(
            "Invalid log level: {}. Valid values are: {:?}",
            settings.log.level, LOG_LEVELS
        )));
    }

    if Rotation::parse(&settings.log.rotation).is_none() {
        return Err(ConfigError::validation(format!(
            "Invalid log rotation '{}': expected a size like '10 MB' or hourly/daily/never",
            settings.log.rotation
        )));
    }

    if parse_retention(&settings.log.retention).is_none() {
        return Err(ConfigError::validation(format!(
            "Invalid log retention '{}': expected an age like '7 days'",
            settings.log.retention
        )));
    }

    Ok(())
}

fn validate_database(settings: &Settings) -> ConfigResult<()> {
    let db = &settings.database;
    if db.url.is_empty() {
        return Err(ConfigError::missing_field("database.url"));
    }
    if db.pool_size < 1 {
        return Err(ConfigError::validation("database.pool_size must be at least 1"));
    }
    if !db.pool_timeout.is_finite() || db.pool_timeout < 0.0 {
        return Err(ConfigError::validation(
            "database.pool_timeout must be a non-negative number of seconds",
        ));
    }
    if settings.redis.url.is_empty() {
        return Err(ConfigError::missing_field("redis.url"));
    }
    Ok(())
}

/// Validates all bot configurations.
fn validate_bots(bots: &[BotConfig]) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for bot in bots {
        if !seen.insert(bot.name.as_str()) {
            return Err(ConfigError::DuplicateBotName(bot.name.clone()));
        }
        validate_bot(bot)?;
    }

    Ok(())
}

/// Validates a single bot configuration.
fn validate_bot(bot: &BotConfig) -> ConfigResult<()> {
    if bot.name.is_empty() {
        return Err(ConfigError::missing_field("bots[].name"));
    }

    if bot.name.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "Bot name '{}' cannot contain whitespace",
            bot.name
        )));
    }

    if bot.token.is_empty() {
        return Err(ConfigError::missing_field(format!("bots.{}.token", bot.name)));
    }

    if !bot.mode.is_polling() {
        let Some(url) = bot.webhook_url() else {
            return Err(ConfigError::missing_field(format!(
                "bots.{}.webhook_url",
                bot.name
            )));
        };
        validate_http_url(url)?;
    }

    Ok(())
}

fn validate_http_url(url: &str) -> ConfigResult<()> {
    let valid_schemes = ["http://", "https://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {:?}", valid_schemes),
        ));
    }
    Ok(())
}

fn validate_misc(settings: &Settings) -> ConfigResult<()> {
    if let Some(machine_id) = settings.snowflake.machine_id
        && machine_id > MAX_MACHINE_ID
    {
        return Err(ConfigError::validation(format!(
            "snowflake.machine_id must be between 0 and {MAX_MACHINE_ID}, got {machine_id}"
        )));
    }

    let rate = settings.throttle.rate_limit;
    if !rate.is_finite() || rate < 0.0 {
        return Err(ConfigError::validation(
            "throttle.rate_limit must be a non-negative number of seconds",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BotMode;

    fn bot(name: &str, mode: BotMode, webhook_url: Option<&str>) -> BotConfig {
        BotConfig {
            name: name.to_string(),
            token: "123:abc".to_string(),
            mode,
            webhook_url: webhook_url.map(str::to_string),
            bot_url: None,
            app_url: None,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        validate_settings(&Settings::default()).unwrap();
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut settings = Settings::default();
        settings.log.level = "warning".to_string();
        validate_settings(&settings).unwrap();

        settings.log.level = "verbose".to_string();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_rotation_and_retention_must_parse() {
        let mut settings = Settings::default();
        settings.log.rotation = "sometimes".to_string();
        assert!(validate_settings(&settings).is_err());

        let mut settings = Settings::default();
        settings.log.retention = "forever-ish".to_string();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_pool_limits() {
        let mut settings = Settings::default();
        settings.database.pool_size = 0;
        assert!(validate_settings(&settings).is_err());

        let mut settings = Settings::default();
        settings.database.pool_timeout = -1.0;
        assert!(validate_settings(&settings).is_err());

        let mut settings = Settings::default();
        settings.database.pool_timeout = 0.0;
        validate_settings(&settings).unwrap();
    }

    #[test]
    fn test_webhook_bot_requires_url() {
        let mut settings = Settings::default();
        settings.bots = vec![bot("hook", BotMode::Webhook, None)];
        assert!(matches!(
            validate_settings(&settings),
            Err(ConfigError::MissingField { .. })
        ));

        settings.bots = vec![bot("hook", BotMode::Webhook, Some(""))];
        assert!(validate_settings(&settings).is_err());

        settings.bots = vec![bot("hook", BotMode::Webhook, Some("ftp://example.com/x"))];
        assert!(matches!(
            validate_settings(&settings),
            Err(ConfigError::InvalidUrl { .. })
        ));

        settings.bots = vec![bot(
            "hook",
            BotMode::Webhook,
            Some("https://example.com/tg-bot/webhook/hook"),
        )];
        validate_settings(&settings).unwrap();
    }

    #[test]
    fn test_polling_bot_needs_no_url() {
        let mut settings = Settings::default();
        settings.bots = vec![bot("poll", BotMode::Polling, None), bot("local", BotMode::Dev, None)];
        validate_settings(&settings).unwrap();
    }

    #[test]
    fn test_bot_names() {
        let mut settings = Settings::default();
        settings.bots = vec![
            bot("main", BotMode::Polling, None),
            bot("main", BotMode::Polling, None),
        ];
        assert!(matches!(
            validate_settings(&settings),
            Err(ConfigError::DuplicateBotName(name)) if name == "main"
        ));

        settings.bots = vec![bot("", BotMode::Polling, None)];
        assert!(validate_settings(&settings).is_err());

        settings.bots = vec![bot("my bot", BotMode::Polling, None)];
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_machine_id_and_throttle() {
        let mut settings = Settings::default();
        settings.snowflake.machine_id = Some(16);
        assert!(validate_settings(&settings).is_err());
        settings.snowflake.machine_id = Some(15);
        validate_settings(&settings).unwrap();

        settings.throttle.rate_limit = -0.1;
        assert!(validate_settings(&settings).is_err());
        settings.throttle.rate_limit = 0.0;
        validate_settings(&settings).unwrap();
    }

    #[test]
    fn test_prod_rejects_default_secret() {
        let mut settings = Settings {
            env: Environment::Prod,
            ..Settings::default()
        };
        assert!(validate_settings(&settings).is_err());

        settings.secret_key = "a-real-secret".to_string();
        validate_settings(&settings).unwrap();

        settings.env = Environment::Dev;
        settings.secret_key = DEFAULT_SECRET_KEY.to_string();
        validate_settings(&settings).unwrap();
    }
}
