//! The `teleserve` command line.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use teleserve_runtime::logging::LoggingBuilder;
use teleserve_runtime::{ConfigLoader, LayeredConfig, Settings, TeleserveRuntime};
use teleserve_storage::database::redact_url;
use teleserve_storage::{DEFAULT_MIGRATIONS_DIR, Database, MigrationManager};

const MASK: &str = "********";

#[derive(Parser, Debug)]
#[command(name = "teleserve")]
#[command(about = "Telegram bot backend: serve, migrate, inspect configuration", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory holding base.config.yml and the environment overlays.
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the service (APP_ENV selects the environment).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Tokio worker threads.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Manage database migrations.
    Migrate {
        #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR)]
        dir: PathBuf,
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Inspect the configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum MigrateAction {
    /// Create an empty up/down migration pair.
    New { description: String },
    /// Apply all pending migrations.
    Up,
    /// Revert to `target`, or by one migration.
    Down { target: Option<i64> },
    /// List every migration with its status.
    History,
    /// Print the latest applied version.
    Current,
    /// Revert every migration.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Load and validate, then show where each key came from.
    Check,
}

impl Cli {
    /// A loader searching `--config-dir` when given.
    pub fn loader(&self) -> ConfigLoader {
        match &self.config_dir {
            Some(dir) => ConfigLoader::new().search_path(dir),
            None => ConfigLoader::new(),
        }
    }
}

/// Runs the parsed command.
pub fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Serve {
            host,
            port,
            workers,
        } => {
            let mut loader = cli.loader();
            if let Some(host) = host {
                loader = loader.set("server.host", host);
            }
            if let Some(port) = port {
                loader = loader.set("server.port", port);
            }
            if let Some(workers) = workers {
                loader = loader.set("server.workers", workers);
            }
            let settings = loader.load()?.extract()?;
            let workers = settings.server.workers;
            block_on(workers, serve(settings))
        }
        Command::Migrate { dir, action } => {
            if let MigrateAction::New { description } = action {
                return new_migration(dir, description);
            }
            let settings = cli.loader().load()?.extract()?;
            block_on(None, migrate(settings, dir.clone(), action))
        }
        Command::Config {
            action: ConfigAction::Check,
        } => {
            let layered = cli.loader().load()?;
            print!("{}", config_report(&layered)?);
            Ok(())
        }
    }
}

fn block_on<F>(workers: Option<usize>, future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = workers {
        builder.worker_threads(workers.max(1));
    }
    builder
        .build()
        .context("failed to start the async runtime")?
        .block_on(future)
}

async fn serve(settings: Settings) -> Result<()> {
    TeleserveRuntime::new(settings).run().await?;
    Ok(())
}

fn new_migration(dir: &Path, description: &str) -> Result<()> {
    let created = MigrationManager::scaffold(dir, description)?;
    println!("Created migration {}", created.version);
    println!("  {}", created.up.display());
    println!("  {}", created.down.display());
    Ok(())
}

async fn migrate(settings: Settings, dir: PathBuf, action: &MigrateAction) -> Result<()> {
    let _guard = LoggingBuilder::new().try_init()?;
    let db = Database::connect(&settings.database.to_options()).await?;
    let manager = MigrationManager::new(db.clone(), &dir)
        .await
        .with_context(|| format!("failed to read migrations from {}", dir.display()))?;

    let result = run_migration(&manager, action).await;
    db.close().await;
    result
}

async fn run_migration(manager: &MigrationManager, action: &MigrateAction) -> Result<()> {
    match action {
        MigrateAction::New { description } => {
            bail!("'{description}': migrations are created without a database")
        }
        MigrateAction::Up => {
            let applied = manager.up().await?;
            if applied.is_empty() {
                println!("Already up to date");
            }
            for version in applied {
                println!("Applied {version}");
            }
        }
        MigrateAction::Down { target } => match manager.down(*target).await? {
            Some(version) => println!("Now at {version}"),
            None => println!("All migrations reverted"),
        },
        MigrateAction::History => {
            for status in manager.history().await? {
                let mark = if status.applied { "applied" } else { "pending" };
                println!("{} {:<8} {}", status.version, mark, status.description);
            }
        }
        MigrateAction::Current => match manager.current().await? {
            Some(version) => println!("{version}"),
            None => println!("No migrations applied"),
        },
        MigrateAction::Reset { yes } => {
            if !yes && !confirm("Revert every migration? Type 'yes' to continue: ")? {
                bail!("reset aborted");
            }
            manager.reset().await?;
            println!("All migrations reverted");
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

// =============================================================================
// config check
// =============================================================================

/// Settings as JSON with credentials hidden.
pub fn masked_settings(settings: &Settings) -> Result<Value> {
    let mut value = serde_json::to_value(settings)?;

    if let Some(secret) = value.get_mut("secret_key") {
        *secret = Value::from(MASK);
    }
    for section in ["database", "redis"] {
        if let Some(Value::String(url)) = value.pointer_mut(&format!("/{section}/url")) {
            *url = redact_url(url);
        }
    }
    if let Some(password) = value.pointer_mut("/redis/password")
        && !password.is_null()
    {
        *password = Value::from(MASK);
    }
    if let Some(Value::Array(bots)) = value.get_mut("bots") {
        for bot in bots {
            if let Some(token) = bot.get_mut("token") {
                *token = Value::from(MASK);
            }
        }
    }
    Ok(value)
}

/// Validates `layered` and renders every top-level key with its source.
pub fn config_report(layered: &LayeredConfig) -> Result<String> {
    let settings = layered.extract()?;
    let masked = masked_settings(&settings)?;

    let files = layered
        .files()
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>();

    let mut report = format!("Environment: {}\n", layered.env());
    if files.is_empty() {
        report.push_str("Files: none\n");
    } else {
        report.push_str(&format!("Files: {}\n", files.join(", ")));
    }

    if let Value::Object(keys) = &masked {
        for (key, value) in keys {
            let source = layered
                .source_of(key)
                .map(|layer| layer.as_str())
                .unwrap_or("defaults");
            report.push_str(&format!("{key} = {value}  [{source}]\n"));
        }
    }
    report.push_str("Configuration OK\n");
    Ok(report)
}
