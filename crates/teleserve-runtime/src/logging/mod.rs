//! Logging setup on `tracing` and `tracing-subscriber`.
//!
//! Console output always goes to stderr. Outside debug mode a file sink is
//! added at `logs/app.log`, rotated by size or time and pruned by age.
//!
//! ```rust,ignore
//! use teleserve_runtime::logging::LoggingBuilder;
//!
//! let _guard = LoggingBuilder::from_settings(&settings).try_init()?;
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured level. Noisy dependencies
//! are pinned to `warn` either way (`sqlx` goes to `info` when
//! `database.echo` is on so statements show up).

pub mod rolling;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation as TimeRotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub use rolling::{Rotation, SizeRollingWriter, parse_retention, parse_size, prune_logs};

use crate::config::{LogFormat, Settings};

/// Directory of the file sink, relative to the working directory.
pub const LOG_DIR: &str = "logs";

/// File stem of the file sink (`app.log`).
pub const LOG_STEM: &str = "app";

const PINNED_TARGETS: [&str; 5] = ["hyper", "hyper_util", "reqwest", "h2", "redis"];

/// Maps a configured level name onto a tracing filter.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => LevelFilter::TRACE,
        "DEBUG" => LevelFilter::DEBUG,
        "WARNING" | "WARN" => LevelFilter::WARN,
        "ERROR" | "CRITICAL" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// Keeps the background file writers alive. Dropping it flushes them.
#[must_use = "dropping the guard stops file logging"]
#[derive(Default)]
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

/// Where and how the file sink writes.
#[derive(Debug, Clone)]
pub struct FileSink {
    pub dir: PathBuf,
    pub rotation: Rotation,
    pub retention: Duration,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// A builder for configuring logging.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: LevelFilter,
    format: LogFormat,
    directives: Vec<String>,
    file: Option<FileSink>,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Console-only logging at info.
    pub fn new() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
            directives: Vec::new(),
            file: None,
        }
    }

    /// Level, format, pinned targets and file sink from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut builder = Self::new()
            .with_level(level_filter(&settings.log.level))
            .format(settings.log.format);

        let sqlx_level = if settings.database.echo { "info" } else { "warn" };
        builder = builder.directive(&format!("sqlx={sqlx_level}"));
        for target in PINNED_TARGETS {
            builder = builder.directive(&format!("{target}=warn"));
        }

        if !settings.debug {
            // Validation guarantees both parse; fall back to the defaults otherwise.
            let rotation =
                Rotation::parse(&settings.log.rotation).unwrap_or(Rotation::Size(10_000_000));
            let retention = parse_retention(&settings.log.retention)
                .unwrap_or(Duration::from_secs(7 * 86_400));
            builder = builder.file_sink(FileSink {
                dir: PathBuf::from(LOG_DIR),
                rotation,
                retention,
            });
        }

        builder
    }

    /// The configured file sink, if any.
    pub fn file(&self) -> Option<&FileSink> {
        self.file.as_ref()
    }

    /// Set the global log level.
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Add a filter directive such as `sqlx=warn`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Also write to a rotating file.
    pub fn file_sink(mut self, sink: FileSink) -> Self {
        self.file = Some(sink);
        self
    }

    /// Build the filter from directives.
    fn build_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(self.level.into()));

        for directive in &self.directives {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }

        filter
    }

    fn fmt_layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true);
        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
    }

    /// Opens the file sink and hands it to a background writer.
    fn file_layer(&self, sink: &FileSink) -> io::Result<(BoxedLayer, WorkerGuard)> {
        std::fs::create_dir_all(&sink.dir)?;
        prune_logs(&sink.dir, LOG_STEM, sink.retention)?;

        let (writer, guard) = match sink.rotation {
            Rotation::Size(max_bytes) => tracing_appender::non_blocking(SizeRollingWriter::new(
                &sink.dir,
                LOG_STEM,
                max_bytes,
                sink.retention,
            )?),
            rotation => {
                let time_rotation = match rotation {
                    Rotation::Hourly => TimeRotation::HOURLY,
                    Rotation::Daily => TimeRotation::DAILY,
                    _ => TimeRotation::NEVER,
                };
                let appender = RollingFileAppender::builder()
                    .rotation(time_rotation)
                    .filename_prefix(LOG_STEM)
                    .filename_suffix("log")
                    .build(&sink.dir)
                    .map_err(io::Error::other)?;
                tracing_appender::non_blocking(appender)
            }
        };
        Ok((self.fmt_layer(writer, false), guard))
    }

    /// Installs the global subscriber.
    ///
    /// Fails only when the file sink cannot be opened. A subscriber that is
    /// already installed is left in place.
    pub fn try_init(self) -> io::Result<LoggingGuard> {
        let mut guards = Vec::new();
        let mut layers = vec![self.fmt_layer(io::stderr, true)];

        if let Some(sink) = &self.file {
            let (layer, guard) = self.file_layer(sink)?;
            layers.push(layer);
            guards.push(guard);
        }

        let filter = self.build_filter();
        if tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .is_err()
        {
            debug!("Logging already initialized");
        }

        Ok(LoggingGuard { _guards: guards })
    }
}

/// Initializes logging from `settings`.
pub fn init_logging(settings: &Settings) -> io::Result<LoggingGuard> {
    LoggingBuilder::from_settings(settings).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_filter("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(level_filter("info"), LevelFilter::INFO);
        assert_eq!(level_filter("Warning"), LevelFilter::WARN);
        assert_eq!(level_filter("ERROR"), LevelFilter::ERROR);
        assert_eq!(level_filter("CRITICAL"), LevelFilter::ERROR);
    }

    #[test]
    fn test_from_settings_pins_targets() {
        let mut settings = Settings::default();
        let builder = LoggingBuilder::from_settings(&settings);
        assert!(builder.directives.contains(&"sqlx=warn".to_string()));
        assert!(builder.directives.contains(&"redis=warn".to_string()));

        settings.database.echo = true;
        let builder = LoggingBuilder::from_settings(&settings);
        assert!(builder.directives.contains(&"sqlx=info".to_string()));
    }

    #[test]
    fn test_file_sink_only_outside_debug() {
        let mut settings = Settings::default();
        let builder = LoggingBuilder::from_settings(&settings);
        let sink = builder.file.expect("file sink");
        assert_eq!(sink.dir, PathBuf::from(LOG_DIR));
        assert_eq!(sink.rotation, Rotation::Size(10_000_000));
        assert_eq!(sink.retention, Duration::from_secs(7 * 86_400));

        settings.debug = true;
        assert!(LoggingBuilder::from_settings(&settings).file.is_none());
    }

    #[test]
    fn test_init_twice_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink {
            dir: dir.path().join("logs"),
            rotation: Rotation::Daily,
            retention: Duration::from_secs(86_400),
        };
        let _first = LoggingBuilder::new().file_sink(sink.clone()).try_init().unwrap();
        let _second = LoggingBuilder::new().file_sink(sink).try_init().unwrap();
        assert!(dir.path().join("logs").is_dir());
    }
}
