//! Logging setup
//!
//! Builds a `tracing-subscriber` registry with an env filter, an optional
//! stderr layer and an optional daily-rolling file layer.

use crate::config::LoggingConfig;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level
    pub level: Level,

    /// Log to file
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// Include thread IDs
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `RUST_LOG`, `DEVICE_SYNC_LOG_FILE` and `DEVICE_SYNC_LOG_STDERR`
    /// on top of this config
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            self.level = level_from_filter(&rust_log);
        }

        if let Ok(log_file) = std::env::var("DEVICE_SYNC_LOG_FILE") {
            self.file_path = Some(PathBuf::from(log_file));
        }

        if let Ok(log_stderr) = std::env::var("DEVICE_SYNC_LOG_STDERR") {
            self.stderr = log_stderr.to_lowercase() != "false";
        }

        self
    }

    /// Derive from the file/env configuration section
    pub fn from_config(logging: &LoggingConfig) -> Self {
        Self {
            level: level_from_filter(&logging.level),
            file_path: logging.file.as_ref().map(PathBuf::from),
            ..Self::default()
        }
    }
}

/// Pick the most verbose level mentioned in a filter string
fn level_from_filter(filter: &str) -> Level {
    let filter = filter.to_lowercase();
    ["trace", "debug", "info", "warn", "error"]
        .iter()
        .find(|name| filter.contains(*name))
        .and_then(|name| Level::from_str(name).ok())
        .unwrap_or(Level::INFO)
}

/// Initialize logging with the given configuration
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let stderr_layer = config.stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_thread_ids(config.thread_ids)
    });

    let file_layer = match &config.file_path {
        Some(file_path) => {
            let directory = file_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(directory)?;

            let file_appender = tracing_appender::rolling::daily(
                directory,
                file_path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("device-sync.log")),
            );

            Some(
                fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(config.thread_ids),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}
