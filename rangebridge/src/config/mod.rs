//! INI configuration file.
//!
//! Settings live in `config.ini` under the platform configuration directory
//! (`~/.config/rangebridge/config.ini` on Linux). Missing keys fall back to
//! their defaults; present keys must parse.
//!
//! ```ini
//! [transfer]
//! transport = unmarshalled
//! chunk_size = 65536
//!
//! [pool]
//! max_outstanding = 256
//!
//! [bootstrap]
//! poll_attempts = 25
//! poll_interval_ms = 100
//!
//! [logging]
//! level = info
//! file = /tmp/rangebridge.log
//! ```

mod keys;

pub use keys::ConfigKey;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::boundary::{DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS};
use crate::coordinator::{TransferConfig, TransportMode, DEFAULT_CHUNK_SIZE};
use crate::logging::LoggingConfig;
use crate::pool::DEFAULT_MAX_OUTSTANDING;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Directory holding the configuration file.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rangebridge")
}

/// Default configuration file path.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// `[transfer]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferSettings {
    pub transport: TransportMode,
    pub chunk_size: usize,
}

/// `[pool]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_outstanding: usize,
}

/// `[bootstrap]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapSettings {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

/// `[logging]` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

/// Parsed configuration file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigFile {
    pub transfer: TransferSettings,
    pub pool: PoolSettings,
    pub bootstrap: BootstrapSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            transfer: TransferSettings {
                transport: TransportMode::default(),
                chunk_size: DEFAULT_CHUNK_SIZE,
            },
            pool: PoolSettings {
                max_outstanding: DEFAULT_MAX_OUTSTANDING,
            },
            bootstrap: BootstrapSettings {
                poll_attempts: DEFAULT_POLL_ATTEMPTS,
                poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

impl ConfigFile {
    /// Load from the default path. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the default path, creating its directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        debug!(path = %path.display(), "saved config file");
        Ok(())
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }

    /// Coordinator configuration from these settings.
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig::default()
            .with_transport(self.transfer.transport)
            .with_chunk_size(self.transfer.chunk_size)
            .with_max_outstanding_buffers(self.pool.max_outstanding)
            .with_readiness_polling(
                self.bootstrap.poll_attempts,
                Duration::from_millis(self.bootstrap.poll_interval_ms),
            )
    }

    /// Logging configuration from these settings.
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.clone(),
            file: self.logging.file.clone(),
            ..LoggingConfig::default()
        }
    }
}
