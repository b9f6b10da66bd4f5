//! Error types for range transfers.
//!
//! Every failure a caller can observe from [`TransferCoordinator`] is a
//! [`BridgeError`]. Boundary-reported failures keep the producer's message;
//! integrity failures are never downgraded to success.
//!
//! [`TransferCoordinator`]: crate::coordinator::TransferCoordinator

use thiserror::Error;

use crate::boundary::FileRef;
use crate::correlation::TaskId;

/// Result type for transfer operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while moving bytes across the producer boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The producer reported a failure; its message is preserved.
    #[error("transfer failed: {message}")]
    Transfer { message: String },

    /// Shared-buffer verification failed and the retry budget is spent.
    ///
    /// `retry_matched` records whether the retry's own comparison passed.
    /// The call fails either way.
    #[error(
        "integrity check failed for file {file} at {position}+{count} \
         (retry matched: {retry_matched})"
    )]
    TransferIntegrity {
        file: FileRef,
        position: u64,
        count: u32,
        retry_matched: bool,
    },

    /// A completion arrived for a task id with no pending waiter.
    #[error("no pending request for task {0}")]
    UnknownCorrelation(TaskId),

    /// The producer runtime never reported ready.
    #[error("producer not ready after {attempts} readiness polls")]
    InitializationTimeout { attempts: u32 },

    /// The caller cancelled the read.
    #[error("transfer canceled")]
    Canceled,

    /// The request parameters are invalid for the destination buffer.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The buffer pool has no capacity left.
    #[error("buffer pool exhausted: {outstanding} buffers outstanding (limit: {limit})")]
    PoolExhausted { outstanding: usize, limit: usize },

    /// A buffer was released into a pool that did not rent it.
    #[error("buffer released to a pool that does not own it")]
    ForeignBuffer,

    /// The coordinator has been shut down.
    #[error("transfer coordinator is shut down")]
    ShutDown,
}

impl BridgeError {
    /// Creates a transfer error from a producer message.
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
        }
    }

    /// Returns true if this error reports a failed integrity check.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::TransferIntegrity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_preserves_message() {
        let err = BridgeError::transfer("NotReadableError: file changed");
        assert_eq!(
            err.to_string(),
            "transfer failed: NotReadableError: file changed"
        );
    }

    #[test]
    fn test_integrity_error_display() {
        let err = BridgeError::TransferIntegrity {
            file: FileRef(3),
            position: 128,
            count: 64,
            retry_matched: true,
        };
        let text = err.to_string();
        assert!(text.contains("file 3"));
        assert!(text.contains("position 128"));
        assert!(text.contains("retry matched: true"));
        assert!(err.is_integrity());
    }

    #[test]
    fn test_unknown_correlation_display() {
        let err = BridgeError::UnknownCorrelation(TaskId(999));
        assert_eq!(err.to_string(), "no pending request for task 999");
        assert!(!err.is_integrity());
    }
}
