//! Coordinator configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::boundary::BootstrapConfig;
use crate::pool::PoolConfig;

/// Default chunk size for streamed reads (64KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Transport used for every read of a coordinator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// Base64 round trip.
    #[default]
    Marshalled,
    /// Shared buffer with verification.
    Unmarshalled,
}

impl TransportMode {
    /// Lowercase name as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Marshalled => "marshalled",
            Self::Unmarshalled => "unmarshalled",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "marshalled" | "encoded" => Ok(Self::Marshalled),
            "unmarshalled" | "shared" => Ok(Self::Unmarshalled),
            other => Err(format!(
                "unknown transport '{}' (expected marshalled or unmarshalled)",
                other
            )),
        }
    }
}

/// Configuration fixed for the lifetime of a coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferConfig {
    /// Transport for every read.
    pub transport: TransportMode,

    /// Buffer pool limits.
    pub pool: PoolConfig,

    /// Producer readiness polling.
    pub bootstrap: BootstrapConfig,

    chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            pool: PoolConfig::default(),
            bootstrap: BootstrapConfig::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferConfig {
    /// Set the transport.
    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    /// Set the outstanding buffer limit.
    pub fn with_max_outstanding_buffers(mut self, max: usize) -> Self {
        self.pool.max_outstanding = max;
        self
    }

    /// Set readiness polling.
    pub fn with_readiness_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.bootstrap = BootstrapConfig {
            poll_attempts: attempts,
            poll_interval: interval,
        };
        self
    }

    /// Chunk size for [`FileStream::read_to_end`](crate::FileStream::read_to_end).
    /// Never zero.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Set the streaming chunk size (minimum 1 byte).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.transport, TransportMode::Marshalled);
        assert_eq!(config.chunk_size(), 64 * 1024);
        assert_eq!(config.bootstrap.poll_attempts, 25);
        assert_eq!(config.bootstrap.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_builder() {
        let config = TransferConfig::default()
            .with_transport(TransportMode::Unmarshalled)
            .with_max_outstanding_buffers(4)
            .with_readiness_polling(3, Duration::from_millis(5))
            .with_chunk_size(0);

        assert_eq!(config.transport, TransportMode::Unmarshalled);
        assert_eq!(config.pool.max_outstanding, 4);
        assert_eq!(config.bootstrap.poll_attempts, 3);
        assert_eq!(config.chunk_size(), 1);
    }

    #[test]
    fn test_transport_parsing() {
        assert_eq!("Unmarshalled".parse(), Ok(TransportMode::Unmarshalled));
        assert_eq!("encoded".parse(), Ok(TransportMode::Marshalled));
        assert!("carrier-pigeon".parse::<TransportMode>().is_err());
        assert_eq!(TransportMode::Unmarshalled.to_string(), "unmarshalled");
    }
}
