//! Correlation of dispatched reads with their out-of-band completions.
//!
//! The unmarshalled channel cannot get its result from the dispatch call: the
//! producer answers later through an inbound signal. Each dispatch therefore
//! registers a pending completion first, keyed by a fresh [`TaskId`], and the
//! inbound handler fulfills it.
//!
//! ```text
//! begin() ──► (TaskId, PendingCompletion)      registry: {id ─► sender}
//!    │
//!    ├─► dispatch to producer (fire-and-forget)
//!    │
//!    └─► await_result(pending, cancel)
//!              ▲
//!              │ oneshot
//!  producer ──► complete(id, n) / fail(id, msg) ──► remove(id) ──► send
//! ```
//!
//! # Races
//!
//! An entry is removed from the map before its sender fires, so an id is
//! fulfilled at most once. Cancellation removes the entry too; a completion
//! arriving afterwards finds no entry and is logged and dropped. A completion
//! that wins the removal but whose waiter has already given up is sent into a
//! closed channel, which is ignored.

mod sink;

pub use sink::CompletionSink;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};

/// Correlation identifier pairing a dispatch with its completion.
///
/// Issued from a monotonically increasing counter and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Single-byte diagnostic marker derived from the id.
    pub fn marker(self) -> u8 {
        (self.0 % 255) as u8
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome delivered to a pending completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The producer wrote this many bytes.
    Read(u32),
    /// The producer reported a failure.
    Failed(String),
    /// The waiter was canceled locally (shutdown).
    Canceled,
}

/// A registered completion slot, consumed by [`CorrelationRegistry::await_result`].
#[derive(Debug)]
pub struct PendingCompletion {
    id: TaskId,
    rx: oneshot::Receiver<Completion>,
}

impl PendingCompletion {
    /// The task id this completion is keyed by.
    pub fn id(&self) -> TaskId {
        self.id
    }
}

/// Concurrent map of task ids to pending completions.
pub struct CorrelationRegistry {
    next_id: AtomicU64,
    pending: DashMap<TaskId, oneshot::Sender<Completion>>,
    unknown_completions: AtomicU64,
}

impl CorrelationRegistry {
    /// Create an empty registry. The first issued id is 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            unknown_completions: AtomicU64::new(0),
        }
    }

    /// Issue a fresh id and register a pending completion for it.
    pub fn begin(&self) -> PendingCompletion {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        debug!(task_id = %id, "registered pending completion");
        PendingCompletion { id, rx }
    }

    /// Fulfill `id` with a byte count.
    ///
    /// An unknown id is logged and reported as
    /// [`BridgeError::UnknownCorrelation`]; it never panics.
    pub fn complete(&self, id: TaskId, bytes_read: u32) -> BridgeResult<()> {
        self.fulfill(id, Completion::Read(bytes_read))
    }

    /// Fulfill `id` with a producer failure. Same unknown-id handling as
    /// [`complete`](Self::complete).
    pub fn fail(&self, id: TaskId, message: impl Into<String>) -> BridgeResult<()> {
        self.fulfill(id, Completion::Failed(message.into()))
    }

    fn fulfill(&self, id: TaskId, completion: Completion) -> BridgeResult<()> {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                if tx.send(completion).is_err() {
                    debug!(task_id = %id, "waiter gone before completion; ignored");
                }
                Ok(())
            }
            None => {
                self.unknown_completions.fetch_add(1, Ordering::Relaxed);
                warn!(task_id = %id, ?completion, "completion for unknown task id dropped");
                Err(BridgeError::UnknownCorrelation(id))
            }
        }
    }

    /// Wait for the completion or for `cancel` to fire.
    ///
    /// On cancellation the entry is removed, so a late completion becomes an
    /// unknown-id no-op.
    pub async fn await_result(
        &self,
        pending: PendingCompletion,
        cancel: &CancellationToken,
    ) -> BridgeResult<u32> {
        let PendingCompletion { id, mut rx } = pending;

        tokio::select! {
            biased;

            result = &mut rx => match result {
                Ok(Completion::Read(n)) => Ok(n),
                Ok(Completion::Failed(message)) => Err(BridgeError::Transfer { message }),
                Ok(Completion::Canceled) | Err(_) => Err(BridgeError::Canceled),
            },
            _ = cancel.cancelled() => {
                self.pending.remove(&id);
                debug!(task_id = %id, "wait canceled");
                Err(BridgeError::Canceled)
            }
        }
    }

    /// Drop the pending entry for `id` without fulfilling it.
    ///
    /// Returns true if an entry was removed.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Fulfill every pending entry with [`Completion::Canceled`].
    ///
    /// Returns the number of waiters released.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<TaskId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut released = 0;
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Completion::Canceled);
                released += 1;
            }
        }
        released
    }

    /// Number of completions currently pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if `id` has a pending completion.
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Completions received for ids with no pending waiter.
    pub fn unknown_completions(&self) -> u64 {
        self.unknown_completions.load(Ordering::Relaxed)
    }
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_ids_are_monotonic() {
        let registry = CorrelationRegistry::new();
        let a = registry.begin();
        let b = registry.begin();
        assert_eq!(a.id(), TaskId(1));
        assert_eq!(b.id(), TaskId(2));
        assert_eq!(registry.pending_count(), 2);
    }

    #[test]
    fn test_marker_wraps_at_255() {
        assert_eq!(TaskId(1).marker(), 1);
        assert_eq!(TaskId(255).marker(), 0);
        assert_eq!(TaskId(256).marker(), 1);
    }

    #[tokio::test]
    async fn test_complete_delivers_byte_count() {
        let registry = CorrelationRegistry::new();
        let pending = registry.begin();
        let id = pending.id();

        registry.complete(id, 42).unwrap();
        assert!(!registry.is_pending(id));

        let result = registry
            .await_result(pending, &CancellationToken::new())
            .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_fail_delivers_message() {
        let registry = CorrelationRegistry::new();
        let pending = registry.begin();
        registry.fail(pending.id(), "NotFoundError").unwrap();

        let result = registry
            .await_result(pending, &CancellationToken::new())
            .await;
        assert_eq!(result, Err(BridgeError::transfer("NotFoundError")));
    }

    #[test]
    fn test_unknown_id_is_reported_not_raised() {
        let registry = CorrelationRegistry::new();
        let _pending = registry.begin();

        let result = registry.complete(TaskId(999), 10);
        assert_eq!(result, Err(BridgeError::UnknownCorrelation(TaskId(999))));
        assert_eq!(registry.pending_count(), 1);
        assert_eq!(registry.unknown_completions(), 1);
    }

    #[test]
    fn test_second_fulfillment_is_unknown() {
        let registry = CorrelationRegistry::new();
        let pending = registry.begin();
        let id = pending.id();

        assert!(registry.complete(id, 1).is_ok());
        assert!(registry.fail(id, "late").is_err());
    }

    #[tokio::test]
    async fn test_cancel_removes_entry_and_tolerates_late_completion() {
        let registry = CorrelationRegistry::new();
        let pending = registry.begin();
        let id = pending.id();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = registry.await_result(pending, &cancel).await;
        assert_eq!(result, Err(BridgeError::Canceled));
        assert!(!registry.is_pending(id));

        // Late producer signal after the local cancel.
        assert_eq!(
            registry.complete(id, 5),
            Err(BridgeError::UnknownCorrelation(id))
        );
    }

    #[tokio::test]
    async fn test_completion_racing_dropped_waiter_is_ignored() {
        let registry = CorrelationRegistry::new();
        let pending = registry.begin();
        let id = pending.id();
        drop(pending);

        // Entry still present, receiver gone: accepted silently.
        assert!(registry.complete(id, 5).is_ok());
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_releases_waiters() {
        let registry = Arc::new(CorrelationRegistry::new());
        let pending = registry.begin();

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .await_result(pending, &CancellationToken::new())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.cancel_all(), 1);
        assert_eq!(waiter.await.unwrap(), Err(BridgeError::Canceled));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_begin_yields_unique_ids() {
        let registry = Arc::new(CorrelationRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    (0..250).map(|_| registry.begin()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        let mut held = Vec::new();
        for handle in handles {
            for pending in handle.await.unwrap() {
                assert!(ids.insert(pending.id()), "duplicate id {}", pending.id());
                held.push(pending);
            }
        }
        assert_eq!(ids.len(), 2000);
        assert_eq!(registry.pending_count(), 2000);
    }
}
