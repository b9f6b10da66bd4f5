//! Addressable configuration keys (`section.key`).

use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ConfigFile};

/// A single configuration setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    TransferTransport,
    TransferChunkSize,
    PoolMaxOutstanding,
    BootstrapPollAttempts,
    BootstrapPollIntervalMs,
    LoggingLevel,
    LoggingFile,
}

impl ConfigKey {
    /// Every key, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::TransferTransport,
            Self::TransferChunkSize,
            Self::PoolMaxOutstanding,
            Self::BootstrapPollAttempts,
            Self::BootstrapPollIntervalMs,
            Self::LoggingLevel,
            Self::LoggingFile,
        ]
    }

    /// Full name, e.g. `transfer.transport`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TransferTransport => "transfer.transport",
            Self::TransferChunkSize => "transfer.chunk_size",
            Self::PoolMaxOutstanding => "pool.max_outstanding",
            Self::BootstrapPollAttempts => "bootstrap.poll_attempts",
            Self::BootstrapPollIntervalMs => "bootstrap.poll_interval_ms",
            Self::LoggingLevel => "logging.level",
            Self::LoggingFile => "logging.file",
        }
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        self.split().0
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        self.split().1
    }

    fn split(&self) -> (&'static str, &'static str) {
        let name = self.name();
        name.split_once('.').unwrap_or(("", name))
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            Self::TransferTransport => config.transfer.transport.to_string(),
            Self::TransferChunkSize => config.transfer.chunk_size.to_string(),
            Self::PoolMaxOutstanding => config.pool.max_outstanding.to_string(),
            Self::BootstrapPollAttempts => config.bootstrap.poll_attempts.to_string(),
            Self::BootstrapPollIntervalMs => config.bootstrap.poll_interval_ms.to_string(),
            Self::LoggingLevel => config.logging.level.clone(),
            Self::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse `value` and store it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            Self::TransferTransport => {
                config.transfer.transport = value.parse().map_err(|e| self.invalid(value, e))?;
            }
            Self::TransferChunkSize => {
                config.transfer.chunk_size = self.parse_positive(value)?;
            }
            Self::PoolMaxOutstanding => {
                config.pool.max_outstanding = self.parse_positive(value)?;
            }
            Self::BootstrapPollAttempts => {
                config.bootstrap.poll_attempts = self.parse_positive(value)?;
            }
            Self::BootstrapPollIntervalMs => {
                config.bootstrap.poll_interval_ms = value
                    .parse()
                    .map_err(|e: std::num::ParseIntError| self.invalid(value, e.to_string()))?;
            }
            Self::LoggingLevel => {
                if value.is_empty() {
                    return Err(self.invalid(value, "level must not be empty".to_string()));
                }
                config.logging.level = value.to_string();
            }
            Self::LoggingFile => {
                config.logging.file = (!value.is_empty()).then(|| PathBuf::from(value));
            }
        }
        Ok(())
    }

    fn parse_positive<T>(&self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default,
        T::Err: std::fmt::Display,
    {
        let parsed: T = value.parse().map_err(|e: T::Err| self.invalid(value, e.to_string()))?;
        if parsed <= T::default() {
            return Err(self.invalid(value, "must be greater than zero".to_string()));
        }
        Ok(parsed)
    }

    fn invalid(&self, value: &str, reason: String) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason,
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
