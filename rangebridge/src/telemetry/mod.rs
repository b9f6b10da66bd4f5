//! Transfer telemetry.
//!
//! Lock-free atomic counters updated by the coordinator and channels, plus a
//! point-in-time [`TransferSnapshot`] for display.
//!
//! ```text
//! Coordinator / Channels ──► TransferMetrics ──► TransferSnapshot ──► CLI
//!                            (atomic counters)   (point-in-time copy)
//! ```

mod snapshot;

pub use snapshot::TransferSnapshot;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::coordinator::TransportMode;

/// Atomic transfer counters.
#[derive(Debug, Default)]
pub struct TransferMetrics {
    reads_started: AtomicU64,
    reads_succeeded: AtomicU64,
    bytes_read: AtomicU64,
    marshalled_reads: AtomicU64,
    unmarshalled_reads: AtomicU64,
    integrity_mismatches: AtomicU64,
    retries: AtomicU64,
    integrity_failures: AtomicU64,
    transfer_failures: AtomicU64,
    cancellations: AtomicU64,
}

impl TransferMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A read entered the coordinator.
    pub fn read_started(&self, transport: TransportMode) {
        self.reads_started.fetch_add(1, Ordering::Relaxed);
        match transport {
            TransportMode::Marshalled => &self.marshalled_reads,
            TransportMode::Unmarshalled => &self.unmarshalled_reads,
        }
        .fetch_add(1, Ordering::Relaxed);
    }

    /// A read returned `bytes` bytes to its caller.
    pub fn read_succeeded(&self, bytes: u32) {
        self.reads_succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(u64::from(bytes), Ordering::Relaxed);
    }

    /// A shared-buffer comparison failed.
    pub fn integrity_mismatch(&self) {
        self.integrity_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// A shared-buffer read was retried.
    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// A read failed its integrity check for good.
    pub fn integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A read failed for any other reason than integrity or cancellation.
    pub fn transfer_failure(&self) {
        self.transfer_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A read was canceled.
    pub fn canceled(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot. `unknown_completions` comes from the registry.
    pub fn snapshot(&self, unknown_completions: u64) -> TransferSnapshot {
        TransferSnapshot {
            reads_started: self.reads_started.load(Ordering::Relaxed),
            reads_succeeded: self.reads_succeeded.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            marshalled_reads: self.marshalled_reads.load(Ordering::Relaxed),
            unmarshalled_reads: self.unmarshalled_reads.load(Ordering::Relaxed),
            integrity_mismatches: self.integrity_mismatches.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            transfer_failures: self.transfer_failures.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            unknown_completions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = TransferMetrics::new();
        metrics.read_started(TransportMode::Marshalled);
        metrics.read_started(TransportMode::Unmarshalled);
        metrics.read_succeeded(10);
        metrics.read_succeeded(2);
        metrics.integrity_mismatch();
        metrics.retry();
        metrics.integrity_failure();

        let snapshot = metrics.snapshot(3);
        assert_eq!(snapshot.reads_started, 2);
        assert_eq!(snapshot.marshalled_reads, 1);
        assert_eq!(snapshot.unmarshalled_reads, 1);
        assert_eq!(snapshot.reads_succeeded, 2);
        assert_eq!(snapshot.bytes_read, 12);
        assert_eq!(snapshot.integrity_mismatches, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.integrity_failures, 1);
        assert_eq!(snapshot.unknown_completions, 3);
    }
}
