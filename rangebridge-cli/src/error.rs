//! CLI error type.

use std::fmt;

use rangebridge::config::ConfigError;
use rangebridge::logging::LoggingError;
use rangebridge::BridgeError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration problem (bad key, bad value, unreadable file).
    Config(String),
    /// Logging could not be set up.
    Logging(String),
    /// Runtime or signal handler setup failed.
    Runtime(String),
    /// A transfer failed.
    Transfer(BridgeError),
    /// Local file I/O failed.
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Transfer(e) if e.is_integrity() => 3,
            CliError::Transfer(BridgeError::Canceled) => 130,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            CliError::Transfer(e) => write!(f, "Transfer error: {}", e),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<BridgeError> for CliError {
    fn from(e: BridgeError) -> Self {
        CliError::Transfer(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangebridge::FileRef;

    #[test]
    fn test_exit_codes() {
        let integrity = CliError::from(BridgeError::TransferIntegrity {
            file: FileRef(1),
            position: 0,
            count: 4,
            retry_matched: true,
        });
        assert_eq!(integrity.exit_code(), 3);
        assert_eq!(CliError::from(BridgeError::Canceled).exit_code(), 130);
        assert_eq!(CliError::Config("x".into()).exit_code(), 2);
        assert_eq!(CliError::from(BridgeError::transfer("boom")).exit_code(), 1);
    }

    #[test]
    fn test_display_prefixes() {
        let err = CliError::Config("unknown key".into());
        assert_eq!(err.to_string(), "Configuration error: unknown key");
    }
}
