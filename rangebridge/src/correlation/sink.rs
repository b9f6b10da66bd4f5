//! Inbound completion signals exposed to the producer side.

use std::sync::Arc;

use super::{CorrelationRegistry, TaskId};

/// The surface a producer calls to report shared-buffer read results.
///
/// Both signals may arrive at any time after dispatch, in any order, and for
/// ids that are no longer pending. Unknown ids are logged by the registry and
/// otherwise ignored.
#[derive(Clone, Debug)]
pub struct CompletionSink {
    registry: Arc<CorrelationRegistry>,
}

impl CompletionSink {
    /// Create a sink feeding `registry`.
    pub fn new(registry: Arc<CorrelationRegistry>) -> Self {
        Self { registry }
    }

    /// The producer wrote `bytes_read` bytes for `task_id`.
    pub fn on_read_completed(&self, task_id: TaskId, bytes_read: u32) {
        let _ = self.registry.complete(task_id, bytes_read);
    }

    /// The producer failed the read for `task_id`.
    pub fn on_read_failed(&self, task_id: TaskId, error_message: &str) {
        let _ = self.registry.fail(task_id, error_message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_sink_completes_pending_read() {
        let registry = Arc::new(CorrelationRegistry::new());
        let sink = CompletionSink::new(Arc::clone(&registry));
        let pending = registry.begin();

        sink.on_read_completed(pending.id(), 7);
        let result = registry
            .await_result(pending, &CancellationToken::new())
            .await;
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn test_sink_tolerates_unknown_ids() {
        let registry = Arc::new(CorrelationRegistry::new());
        let sink = CompletionSink::new(Arc::clone(&registry));

        sink.on_read_completed(TaskId(999), 3);
        sink.on_read_failed(TaskId(1000), "gone");
        assert_eq!(registry.unknown_completions(), 2);
        assert_eq!(registry.pending_count(), 0);
    }
}
