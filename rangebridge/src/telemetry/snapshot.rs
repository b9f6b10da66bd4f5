//! Point-in-time copy of transfer counters.

use std::fmt;

/// Snapshot of [`TransferMetrics`](super::TransferMetrics).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub reads_started: u64,
    pub reads_succeeded: u64,
    pub bytes_read: u64,
    pub marshalled_reads: u64,
    pub unmarshalled_reads: u64,
    pub integrity_mismatches: u64,
    pub retries: u64,
    pub integrity_failures: u64,
    pub transfer_failures: u64,
    pub cancellations: u64,
    pub unknown_completions: u64,
}

impl TransferSnapshot {
    /// Reads that ended in any failure, cancellation included.
    pub fn reads_failed(&self) -> u64 {
        self.integrity_failures + self.transfer_failures + self.cancellations
    }
}

impl fmt::Display for TransferSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reads: {} started, {} ok, {} failed ({} bytes) | marshalled: {}, unmarshalled: {} | \
             mismatches: {}, retries: {}, integrity failures: {} | unknown completions: {}",
            self.reads_started,
            self.reads_succeeded,
            self.reads_failed(),
            self.bytes_read,
            self.marshalled_reads,
            self.unmarshalled_reads,
            self.integrity_mismatches,
            self.retries,
            self.integrity_failures,
            self.unknown_completions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_summarizes_counters() {
        let snapshot = TransferSnapshot {
            reads_started: 3,
            reads_succeeded: 2,
            bytes_read: 20,
            integrity_failures: 1,
            ..Default::default()
        };
        let text = snapshot.to_string();
        assert!(text.starts_with("reads: 3 started, 2 ok, 1 failed (20 bytes)"));
        assert!(text.contains("integrity failures: 1"));
    }
}
