//! Shared-buffer verification and the retry decision.
//!
//! # State Machine
//!
//! ```text
//! attempt 1 --[match]----------------------------> Accept
//! attempt 1 --[mismatch]-------------------------> Retry
//! attempt 2 --[mismatch]-------------------------> Fail (retry_matched = false)
//! attempt 2 --[match]----------------------------> Fail (retry_matched = true)
//! ```
//!
//! A retried read fails even when the retry verifies; `retry_matched` on the
//! resulting error tells the two cases apart.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::correlation::TaskId;
use crate::request::ReadRequest;

/// Attempts per read, initial attempt included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Bytes shown on each side of the first difference in diagnostics.
const DIAGNOSTIC_WINDOW: usize = 16;

/// Result of comparing a shared buffer against its reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    /// Buffers and byte counts agree.
    Match,
    /// Buffers differ; `first_difference` is the first differing index.
    ContentMismatch { first_difference: usize },
    /// Buffers agree but the reported byte counts do not.
    LengthMismatch { shared: u32, reference: u32 },
}

impl Verification {
    /// Returns true for [`Verification::Match`].
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// What to do after an attempt has been verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the shared-buffer bytes to the caller.
    Accept,
    /// Run the whole attempt again with fresh buffers and a fresh id.
    Retry,
    /// Fail the read with an integrity error.
    Fail { retry_matched: bool },
}

/// Retry budget for one unmarshalled read.
///
/// Holds no per-call state; the attempt number lives with the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Decide the next step for `attempt` (1-based) given its verification.
    pub fn decide(&self, attempt: u32, verification: Verification) -> RetryDecision {
        let retried = attempt > 1;
        match (verification.is_match(), retried) {
            (true, false) => RetryDecision::Accept,
            (matched, true) if attempt >= self.max_attempts => RetryDecision::Fail {
                retry_matched: matched,
            },
            (false, _) if attempt < self.max_attempts => RetryDecision::Retry,
            (matched, _) => RetryDecision::Fail {
                retry_matched: retried && matched,
            },
        }
    }
}

/// Byte-for-byte comparison of shared and reference buffers.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Compare the full allocated length of both buffers, then the counts.
    pub fn verify(
        &self,
        shared: &[u8],
        shared_bytes: u32,
        reference: &[u8],
        reference_bytes: u32,
    ) -> Verification {
        if let Some(first_difference) = first_difference(shared, reference) {
            return Verification::ContentMismatch { first_difference };
        }
        if shared_bytes != reference_bytes {
            return Verification::LengthMismatch {
                shared: shared_bytes,
                reference: reference_bytes,
            };
        }
        Verification::Match
    }

    /// Log the call parameters and both buffers for a failed comparison.
    pub fn report_mismatch(
        &self,
        request: &ReadRequest,
        task_id: TaskId,
        attempt: u32,
        verification: Verification,
        shared: &[u8],
        reference: &[u8],
    ) {
        let params = serde_json::to_string(request).unwrap_or_else(|_| format!("{:?}", request));
        let center = match verification {
            Verification::ContentMismatch { first_difference } => first_difference,
            _ => request.offset(),
        };

        warn!(
            task_id = %task_id,
            attempt,
            request = %params,
            ?verification,
            shared_sha256 = %sha256_hex(shared),
            reference_sha256 = %sha256_hex(reference),
            shared_window = %hex_window(shared, center),
            reference_window = %hex_window(reference, center),
            "shared buffer failed verification"
        );
    }
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn hex_window(bytes: &[u8], center: usize) -> String {
    let start = center.saturating_sub(DIAGNOSTIC_WINDOW).min(bytes.len());
    let end = center.saturating_add(DIAGNOSTIC_WINDOW).min(bytes.len());
    let hex: Vec<String> = bytes[start..end]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("@{}: {}", start, hex.join(" "))
}
