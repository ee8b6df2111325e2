//! Bot manager: owns every configured bot and answers webhook lookups.

use std::sync::Arc;

use async_trait::async_trait;
use teleserve_core::security::webhook_secret;
use teleserve_core::{BotSummary, TelegramApi, Update, WebhookReceiver, WebhookTarget};
use teleserve_framework::{CommonHandlers, Dispatcher, LoggingMiddleware, ThrottlingMiddleware};
use teleserve_storage::UserRepository;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::bot::BotInstance;
use crate::config::Settings;
use crate::error::RuntimeResult;
use crate::sync::UserSyncMiddleware;

/// Registry of bots, in registration order.
#[derive(Default)]
pub struct BotManager {
    bots: RwLock<Vec<Arc<BotInstance>>>,
    throttles: Vec<Arc<ThrottlingMiddleware>>,
}

impl BotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bot for every entry in `settings.bots`, each with the
    /// default middlewares and handlers.
    ///
    /// `users`, when given, records users who send `/start`. `api_base`
    /// points the clients at a Bot API server.
    pub async fn from_settings(
        settings: &Settings,
        users: Option<UserRepository>,
        api_base: &str,
    ) -> RuntimeResult<Self> {
        let mut manager = Self::new();
        let app_url = settings.main_bot().and_then(|bot| bot.app_url.clone());

        for config in &settings.bots {
            let throttle = Arc::new(ThrottlingMiddleware::from_secs_f64(
                settings.throttle.rate_limit,
            ));

            let mut dispatcher = Dispatcher::new();
            dispatcher.add_middleware(LoggingMiddleware);
            dispatcher.add_middleware_arc(throttle.clone());
            if let Some(users) = &users {
                dispatcher.add_middleware(UserSyncMiddleware::new(users.clone()));
            }
            dispatcher.register_matchers(
                CommonHandlers::new(&settings.app_name)
                    .with_app_url(app_url.clone())
                    .matchers(),
            );

            let api = TelegramApi::with_base(&config.token, api_base)?;
            let secret = (!config.mode.is_polling())
                .then(|| webhook_secret(&settings.secret_key, &config.name));
            let bot = BotInstance::new(config, api, dispatcher).with_webhook_secret(secret);

            manager.throttles.push(throttle);
            manager.register(bot).await;
        }

        Ok(manager)
    }

    /// Adds a bot, replacing any bot with the same name.
    pub async fn register(&self, bot: BotInstance) -> Arc<BotInstance> {
        let bot = Arc::new(bot);
        let mut bots = self.bots.write().await;

        if let Some(slot) = bots.iter_mut().find(|b| b.name() == bot.name()) {
            warn!(bot = %bot.name(), "Bot already registered, will be replaced");
            *slot = Arc::clone(&bot);
        } else {
            bots.push(Arc::clone(&bot));
        }

        info!(bot = %bot.name(), mode = bot.mode().as_str(), "Bot registered");
        bot
    }

    pub async fn get(&self, name: &str) -> Option<Arc<BotInstance>> {
        self.bots
            .read()
            .await
            .iter()
            .find(|bot| bot.name() == name)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.bots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bots.read().await.is_empty()
    }

    /// Starts every bot in registration order. The first failure aborts.
    pub async fn start(&self) -> RuntimeResult<()> {
        let bots = self.bots.read().await.clone();
        if bots.is_empty() {
            warn!("No bots registered");
            return Ok(());
        }

        for bot in bots {
            bot.start().await?;
        }
        Ok(())
    }

    /// Stops every bot, then forgets them.
    pub async fn stop(&self) {
        let bots = std::mem::take(&mut *self.bots.write().await);
        if bots.is_empty() {
            return;
        }

        info!("Stopping all bots");
        for bot in bots {
            bot.stop().await;
        }
    }

    /// Drops stale throttling entries of every bot. Returns how many went.
    pub fn purge_throttles(&self) -> usize {
        self.throttles.iter().map(|t| t.purge_stale()).sum()
    }
}

#[async_trait]
impl WebhookReceiver for BotManager {
    async fn lookup(&self, bot_name: &str) -> WebhookTarget {
        match self.get(bot_name).await {
            None => WebhookTarget::NotFound,
            Some(bot) if bot.is_polling() => WebhookTarget::Polling,
            Some(bot) => WebhookTarget::Webhook {
                secret: bot.webhook_secret().map(str::to_string),
            },
        }
    }

    async fn feed_update(&self, bot_name: &str, update: Update) -> bool {
        match self.get(bot_name).await {
            Some(bot) => {
                bot.feed_update(update).await;
                true
            }
            None => false,
        }
    }

    async fn summaries(&self) -> Vec<BotSummary> {
        self.bots
            .read()
            .await
            .iter()
            .map(|bot| bot.summary())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BotConfig, BotMode};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bot_config(name: &str, mode: BotMode) -> BotConfig {
        BotConfig {
            name: name.to_string(),
            token: format!("{name}:token"),
            mode,
            webhook_url: (mode == BotMode::Webhook)
                .then(|| format!("https://example.com/tg-bot/webhook/{name}")),
            bot_url: None,
            app_url: Some("https://app.example.com".to_string()),
        }
    }

    fn settings() -> Settings {
        Settings {
            secret_key: "k".to_string(),
            bots: vec![
                bot_config("main", BotMode::Polling),
                bot_config("hook", BotMode::Webhook),
            ],
            ..Settings::default()
        }
    }

    fn instance(name: &str, mode: BotMode) -> BotInstance {
        let api = TelegramApi::with_base("1:test", "http://127.0.0.1:9").unwrap();
        BotInstance::new(&bot_config(name, mode), api, Dispatcher::new())
    }

    #[tokio::test]
    async fn test_from_settings_registers_in_order() {
        let manager = BotManager::from_settings(&settings(), None, "http://127.0.0.1:9")
            .await
            .unwrap();
        assert_eq!(manager.len().await, 2);

        let names: Vec<_> = manager
            .summaries()
            .await
            .into_iter()
            .map(|s| (s.name, s.mode))
            .collect();
        assert_eq!(
            names,
            vec![
                ("main".to_string(), "polling".to_string()),
                ("hook".to_string(), "webhook".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_lookup() {
        let manager = BotManager::from_settings(&settings(), None, "http://127.0.0.1:9")
            .await
            .unwrap();

        assert_eq!(manager.lookup("main").await, WebhookTarget::Polling);
        assert_eq!(manager.lookup("missing").await, WebhookTarget::NotFound);
        assert_eq!(
            manager.lookup("hook").await,
            WebhookTarget::Webhook {
                secret: Some(webhook_secret("k", "hook"))
            }
        );
    }

    #[tokio::test]
    async fn test_register_replaces_same_name() {
        let manager = BotManager::new();
        manager.register(instance("main", BotMode::Polling)).await;
        manager.register(instance("main", BotMode::Webhook)).await;

        assert_eq!(manager.len().await, 1);
        assert!(!manager.get("main").await.unwrap().is_polling());
    }

    #[tokio::test]
    async fn test_feed_unknown_bot() {
        let manager = BotManager::new();
        let update = Update::from_value(json!({"update_id": 1})).unwrap();
        assert!(!manager.feed_update("ghost", update).await);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let empty = BotManager::new();
        empty.start().await.unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bothook:token/setWebhook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let settings = Settings {
            bots: vec![bot_config("hook", BotMode::Webhook)],
            ..settings()
        };
        let manager = BotManager::from_settings(&settings, None, &server.uri())
            .await
            .unwrap();
        manager.start().await.unwrap();
        assert!(manager.get("hook").await.unwrap().is_running());

        manager.stop().await;
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_throttles() {
        let manager = BotManager::from_settings(&settings(), None, "http://127.0.0.1:9")
            .await
            .unwrap();
        assert_eq!(manager.purge_throttles(), 0);
    }
}
