//! Logging setup.
//!
//! Events go to stderr and, when configured, to a log file written by a
//! non-blocking background worker. `RUST_LOG` overrides the configured level.
//! With the `profiling` feature a Chrome trace (`trace-*.json`) is recorded
//! as well.

use std::path::{Path, PathBuf};

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("log file path has no file name: {0}")]
    InvalidPath(PathBuf),

    #[error("failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Logging options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `rangebridge=debug`.
    pub level: String,
    /// Optional log file, appended to.
    pub file: Option<PathBuf>,
    /// Colorize stderr output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            ansi: true,
        }
    }
}

/// Keeps background log writers alive; drop it on exit to flush.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
    #[cfg(feature = "profiling")]
    _chrome: tracing_chrome::FlushGuard,
}

/// Build the event filter, letting `RUST_LOG` take precedence.
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidFilter {
        filter: level.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = build_filter(&config.level)?;
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(offset, Rfc3339);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_timer(timer.clone());

    let (file_layer, file_guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);

    #[cfg(feature = "profiling")]
    let (subscriber, chrome_guard) = {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .include_args(true)
            .build();
        (subscriber.with(layer), guard)
    };

    subscriber
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file: file_guard,
        #[cfg(feature = "profiling")]
        _chrome: chrome_guard,
    })
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggingError> {
    let name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.to_path_buf()))?;
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    Ok(tracing_appender::rolling::never(dir, name))
}
