//! A single managed Telegram bot.
//!
//! A bot either long-polls `getUpdates` in its own task or has Telegram push
//! updates to the webhook route, which calls [`BotInstance::feed_update`].
//!
//! ```text
//! polling:  start ─▶ deleteWebhook ─▶ spawn loop { getUpdates ─▶ dispatch }
//! webhook:  start ─▶ setWebhook(url, secret)      HTTP ─▶ feed_update ─▶ dispatch
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use teleserve_core::{BotSummary, TelegramApi, Update};
use teleserve_framework::{DispatchOutcome, Dispatcher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{BotConfig, BotMode};
use crate::error::{RuntimeError, RuntimeResult};

/// Long-poll timeout passed to `getUpdates`.
pub const POLL_TIMEOUT_SECS: u64 = 30;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

struct PollingTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// One bot: its API client, dispatcher and receive mode.
pub struct BotInstance {
    name: String,
    mode: BotMode,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
    bot_url: Option<String>,
    app_url: Option<String>,
    api: Arc<TelegramApi>,
    dispatcher: Arc<Dispatcher>,
    polling: Mutex<Option<PollingTask>>,
    running: AtomicBool,
}

impl std::fmt::Debug for BotInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotInstance")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("webhook_url", &self.webhook_url)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl BotInstance {
    pub fn new(config: &BotConfig, api: TelegramApi, dispatcher: Dispatcher) -> Self {
        Self {
            name: config.name.clone(),
            mode: config.mode,
            webhook_url: config.webhook_url().map(str::to_string),
            webhook_secret: None,
            bot_url: config.bot_url.clone(),
            app_url: config.app_url.clone(),
            api: Arc::new(api),
            dispatcher: Arc::new(dispatcher),
            polling: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Secret Telegram must echo in `X-Telegram-Bot-Api-Secret-Token`.
    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> BotMode {
        self.mode
    }

    pub fn is_polling(&self) -> bool {
        self.mode.is_polling()
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    pub fn api(&self) -> &Arc<TelegramApi> {
        &self.api
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> BotSummary {
        BotSummary {
            name: self.name.clone(),
            mode: self.mode.as_str().to_string(),
            running: self.is_running(),
            bot_url: self.bot_url.clone(),
            app_url: self.app_url.clone(),
        }
    }

    /// Starts receiving updates.
    pub async fn start(&self) -> RuntimeResult<()> {
        if self.is_running() {
            warn!(bot = %self.name, "Bot already running");
            return Ok(());
        }

        if self.is_polling() {
            self.start_polling().await?;
        } else {
            self.setup_webhook().await?;
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn start_polling(&self) -> RuntimeResult<()> {
        self.api.delete_webhook(true).await?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.name.clone(),
            Arc::clone(&self.api),
            Arc::clone(&self.dispatcher),
            cancel.clone(),
        ));
        *self.polling.lock() = Some(PollingTask { cancel, handle });

        info!(bot = %self.name, "Bot started polling");
        Ok(())
    }

    async fn setup_webhook(&self) -> RuntimeResult<()> {
        let url = self
            .webhook_url
            .as_deref()
            .ok_or_else(|| RuntimeError::MissingWebhookUrl(self.name.clone()))?;

        self.api
            .set_webhook(url, true, self.webhook_secret.as_deref())
            .await?;

        info!(bot = %self.name, url = %url, "Bot webhook set");
        Ok(())
    }

    /// Stops polling and waits for the loop to exit. Webhook bots keep their
    /// registration so Telegram queues updates while the service is down.
    pub async fn stop(&self) {
        let task = self.polling.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                error!(bot = %self.name, error = %e, "Polling task failed");
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!(bot = %self.name, "Bot stopped");
    }

    /// Dispatches one update.
    pub async fn feed_update(&self, update: Update) -> DispatchOutcome {
        self.dispatcher
            .dispatch(update, &self.name, Arc::clone(&self.api))
            .await
    }
}

/// Long-polls until `cancel` fires. Errors back off exponentially unless
/// Telegram sent `retry_after`, which is honoured as is.
async fn poll_loop(
    name: String,
    api: Arc<TelegramApi>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) {
    let mut offset: Option<i64> = None;
    let mut backoff = MIN_BACKOFF;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(offset, POLL_TIMEOUT_SECS) => result,
        };

        match result {
            Ok(batch) => {
                backoff = MIN_BACKOFF;
                if batch.next_offset.is_some() {
                    offset = batch.next_offset;
                }
                for update in batch.updates {
                    let dispatcher = Arc::clone(&dispatcher);
                    let api = Arc::clone(&api);
                    let name = name.clone();
                    tokio::spawn(async move {
                        dispatcher.dispatch(update, &name, api).await;
                    });
                }
            }
            Err(e) => {
                let delay = match e.retry_after() {
                    Some(secs) => Duration::from_secs(secs),
                    None => {
                        let delay = backoff;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        delay
                    }
                };
                warn!(bot = %name, error = %e, delay_secs = delay.as_secs(), "Polling failed, retrying");

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    debug!(bot = %name, "Polling loop exited");
}
