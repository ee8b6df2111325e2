//! Application lifecycle.
//!
//! [`TeleserveRuntime`] brings the service up in dependency order and tears
//! it down in reverse:
//!
//! ```text
//! start:  logging ─▶ snowflake ─▶ database ─▶ cache ─▶ bots ─▶ scheduler ─▶ HTTP
//! stop:   HTTP ─▶ scheduler ─▶ bots ─▶ cache ─▶ database
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use teleserve_runtime::{TeleserveRuntime, load_settings};
//!
//! let runtime = TeleserveRuntime::new(load_settings()?);
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use teleserve_core::{
    BoxedWebhookReceiver, DEFAULT_API_BASE, SnowflakeError, TokenService, init_snowflake,
};
use teleserve_storage::{Cache, Database, DistributedLock, UserRepository};
use teleserve_transport::{AppState, HttpServer, ServerOptions, TransportResult};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::RuntimeResult;
use crate::logging::rolling::{Rotation, prune_logs};
use crate::logging::{LOG_STEM, LoggingBuilder};
use crate::manager::BotManager;
use crate::scheduler::{JobLock, JobOptions, Scheduler};

/// How often stale throttling entries are dropped.
pub const THROTTLE_GC_INTERVAL: Duration = Duration::from_secs(600);

/// The teleserve service.
pub struct TeleserveRuntime {
    settings: Settings,
    api_base: String,
    cache: Option<Arc<Cache>>,
}

impl TeleserveRuntime {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            api_base: DEFAULT_API_BASE.to_string(),
            cache: None,
        }
    }

    /// Uses `cache` instead of connecting to `redis.url` on start.
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Points every bot at another Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Initializes logging, runs until Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        let _guard = LoggingBuilder::from_settings(&self.settings).try_init()?;
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let running = self.start().await?;
        info!(
            app = %self.settings.app_name,
            env = %self.settings.env,
            "teleserve is now running. Press Ctrl+C to stop."
        );

        shutdown.await;
        running.shutdown().await
    }

    /// Brings every component up. A failing step aborts startup after the
    /// components already started are shut down again.
    pub async fn start(&self) -> RuntimeResult<RunningApp> {
        let settings = &self.settings;
        info!(app = %settings.app_name, env = %settings.env, "Starting");

        match init_snowflake(settings.snowflake.machine_id) {
            Ok(machine_id) => info!(machine_id, "Snowflake generator initialized"),
            Err(SnowflakeError::AlreadyInitialized) => {
                debug!("Snowflake generator already initialized")
            }
            Err(e) => return Err(e.into()),
        }

        let db = Database::connect_lazy(&settings.database.to_options())?;
        let cache = match &self.cache {
            Some(cache) => Arc::clone(cache),
            None => match Cache::connect(&settings.redis.url, settings.redis.password.as_deref()).await {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    db.close().await;
                    return Err(e.into());
                }
            },
        };
        let users = UserRepository::new(db.clone());

        let bots = match BotManager::from_settings(settings, Some(users.clone()), &self.api_base).await {
            Ok(bots) => Arc::new(bots),
            Err(e) => {
                cache.close();
                db.close().await;
                return Err(e);
            }
        };

        let mut app = RunningApp {
            db,
            cache,
            bots,
            scheduler: Arc::new(Scheduler::new()),
            http: None,
        };

        if let Err(e) = app.bots.start().await {
            app.shutdown_quietly().await;
            return Err(e);
        }

        let lock = settings.scheduler.distributed.then(|| {
            Arc::new(DistributedLock::new(Arc::clone(&app.cache))) as Arc<dyn JobLock>
        });
        app.scheduler = match build_scheduler(settings, lock, &app.bots) {
            Ok(scheduler) => Arc::new(scheduler),
            Err(e) => {
                app.shutdown_quietly().await;
                return Err(e);
            }
        };
        app.scheduler.start().await;

        let state = AppState::new(
            ServerOptions::new(&settings.app_name).with_docs(settings.docs_enabled()),
            Arc::clone(&app.bots) as BoxedWebhookReceiver,
            TokenService::new(&settings.secret_key),
        )
        .with_users(users)
        .with_main_bot_token(settings.main_bot().map(|bot| bot.token.clone()));

        let server = match HttpServer::bind(&settings.server.addr(), Arc::new(state)).await {
            Ok(server) => server,
            Err(e) => {
                app.shutdown_quietly().await;
                return Err(e.into());
            }
        };
        let local_addr = server.local_addr()?;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve(cancel.clone()));
        app.http = Some(HttpTask {
            cancel,
            handle,
            local_addr,
        });

        Ok(app)
    }
}

/// Builds the scheduler with the maintenance jobs.
fn build_scheduler(
    settings: &Settings,
    lock: Option<Arc<dyn JobLock>>,
    bots: &Arc<BotManager>,
) -> RuntimeResult<Scheduler> {
    let mut scheduler = Scheduler::new().with_defaults(JobOptions {
        distributed: settings.scheduler.distributed,
        lock_ttl: Duration::from_secs(settings.scheduler.lock_ttl),
    });
    if let Some(lock) = lock {
        scheduler = scheduler.with_lock(lock);
    }

    let throttled = Arc::clone(bots);
    scheduler.add_interval_job("throttle_gc", THROTTLE_GC_INTERVAL, move || {
        let bots = Arc::clone(&throttled);
        async move {
            let purged = bots.purge_throttles();
            debug!(purged, "Throttling entries purged");
            Ok::<_, anyhow::Error>(())
        }
    })?;

    // Size-rotated files are pruned by the writer itself.
    let logging = LoggingBuilder::from_settings(settings);
    if let Some(sink) = logging.file().filter(|sink| !matches!(sink.rotation, Rotation::Size(_))) {
        let sink = sink.clone();
        scheduler.add_daily_job("log_retention", 3, 0, 0, move || {
            let sink = sink.clone();
            async move {
                let removed = tokio::task::spawn_blocking(move || {
                    prune_logs(&sink.dir, LOG_STEM, sink.retention)
                })
                .await??;
                info!(removed, "Expired log files removed");
                Ok::<_, anyhow::Error>(())
            }
        })?;
    }

    Ok(scheduler)
}

struct HttpTask {
    cancel: CancellationToken,
    handle: JoinHandle<TransportResult<()>>,
    local_addr: SocketAddr,
}

/// Handles to a started service.
pub struct RunningApp {
    db: Database,
    cache: Arc<Cache>,
    bots: Arc<BotManager>,
    scheduler: Arc<Scheduler>,
    http: Option<HttpTask>,
}

impl RunningApp {
    /// Address the HTTP server listens on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().map(|http| http.local_addr)
    }

    pub fn bots(&self) -> &Arc<BotManager> {
        &self.bots
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Stops every component in reverse start order.
    pub async fn shutdown(mut self) -> RuntimeResult<()> {
        info!("Shutting down");
        let mut result = Ok(());

        if let Some(http) = self.http.take() {
            http.cancel.cancel();
            match http.handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "HTTP server failed");
                    result = Err(e.into());
                }
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
        }

        self.shutdown_quietly().await;
        info!("Shutdown complete");
        result
    }

    async fn shutdown_quietly(&self) {
        self.scheduler.stop().await;
        self.bots.stop().await;
        self.cache.close();
        self.db.close().await;
    }
}

/// Waits for Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, waiting for Ctrl+C only");
                ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, LogConfig, RedisConfig, SchedulerConfig};
    use crate::error::RuntimeError;
    use crate::scheduler::MemoryLock;

    fn settings(rotation: &str, debug: bool) -> Settings {
        Settings {
            debug,
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                ..DatabaseConfig::default()
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:1/0".to_string(),
                password: None,
            },
            log: LogConfig {
                rotation: rotation.to_string(),
                ..LogConfig::default()
            },
            ..Settings::default()
        }
    }


    #[tokio::test]
    async fn test_unreachable_redis_aborts_startup() {
        let runtime = TeleserveRuntime::new(settings("10 MB", true));
        let err = runtime.start().await.err().unwrap();
        assert!(matches!(err, RuntimeError::Storage(_)));
    }

    #[tokio::test]
    async fn test_start_serves_health_then_shuts_down() {
        let mut settings = settings("daily", false);
        settings.server.port = 0;
        let runtime = TeleserveRuntime::new(settings).with_cache(Arc::new(Cache::disconnected()));

        let app = runtime.start().await.unwrap();
        let addr = app.local_addr().unwrap();
        let scheduler = Arc::clone(app.scheduler());
        assert!(scheduler.is_running());
        assert_eq!(scheduler.list_jobs().len(), 2);
        assert!(app.bots().is_empty().await);

        let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");

        app.shutdown().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(reqwest::get(format!("http://{addr}/health")).await.is_err());
    }

    #[test]
    fn test_maintenance_jobs() {
        let bots = Arc::new(BotManager::new());

        let scheduler = build_scheduler(&settings("10 MB", false), None, &bots).unwrap();
        let ids: Vec<_> = scheduler.list_jobs().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["throttle_gc"]);

        let scheduler = build_scheduler(&settings("daily", false), None, &bots).unwrap();
        let ids: Vec<_> = scheduler.list_jobs().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["log_retention", "throttle_gc"]);

        let scheduler = build_scheduler(&settings("daily", true), None, &bots).unwrap();
        assert_eq!(scheduler.list_jobs().len(), 1);
    }

    #[test]
    fn test_distributed_jobs() {
        let bots = Arc::new(BotManager::new());
        let settings = Settings {
            scheduler: SchedulerConfig {
                distributed: true,
                lock_ttl: 60,
            },
            ..settings("10 MB", true)
        };
        let scheduler =
            build_scheduler(&settings, Some(Arc::new(MemoryLock::new())), &bots).unwrap();
        assert!(scheduler.get_job_info("throttle_gc").unwrap().distributed);
    }
}
