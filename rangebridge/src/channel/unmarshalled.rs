//! Shared-buffer (unmarshalled) transport.
//!
//! One attempt:
//!
//! ```text
//! 1. rent buffers A and B (destination length), zero-fill both
//! 2. register task id, stamp A[0] = B[0] = id % 255
//! 3. dispatch {A, offset, count, file, position, id}  (returns immediately)
//! 4. await completion ──► bytes_read_A, reclaim A
//! 5. marshalled reference read into buffer B
//! 6. compare A and B over their full length
//! ```
//!
//! A verified first attempt copies `bytes_read_A` bytes from A into the
//! destination. A failed first attempt is retried once from step 1 with a new
//! id and new buffers; see [`RetryPolicy`] for the terminal outcomes. Buffers
//! are pool guards, so they go back on every path out of an attempt. Both are
//! rented before anything is dispatched, so pool exhaustion never reaches the
//! producer.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::marshalled::MarshalledChannel;
use super::verify::{IntegrityVerifier, RetryDecision, RetryPolicy, Verification};
use crate::boundary::{Producer, SharedReadRequest};
use crate::correlation::{CompletionSink, CorrelationRegistry, TaskId};
use crate::error::{BridgeError, BridgeResult};
use crate::pool::{BufferPool, PooledBuffer, SharedRegion};
use crate::request::ReadRequest;
use crate::telemetry::TransferMetrics;

/// The buffers and verdict of one verified attempt.
struct AttemptOutcome {
    task_id: TaskId,
    bytes_read: u32,
    shared: PooledBuffer,
    reference: PooledBuffer,
    verification: Verification,
}

/// Range reads through a buffer shared with the producer.
pub struct UnmarshalledChannel {
    producer: Arc<dyn Producer>,
    registry: Arc<CorrelationRegistry>,
    sink: CompletionSink,
    pool: BufferPool,
    reference: MarshalledChannel,
    verifier: IntegrityVerifier,
    policy: RetryPolicy,
    metrics: Arc<TransferMetrics>,
}

impl UnmarshalledChannel {
    /// Create a channel. `registry` must be the one the producer's
    /// completions are routed to.
    pub fn new(
        producer: Arc<dyn Producer>,
        registry: Arc<CorrelationRegistry>,
        pool: BufferPool,
        metrics: Arc<TransferMetrics>,
    ) -> Self {
        Self {
            reference: MarshalledChannel::new(Arc::clone(&producer)),
            sink: CompletionSink::new(Arc::clone(&registry)),
            producer,
            registry,
            pool,
            verifier: IntegrityVerifier,
            policy: RetryPolicy::default(),
            metrics,
        }
    }

    /// Read `request` into `destination`, verifying the shared buffer.
    ///
    /// `request` must already be clamped to `destination.len()`.
    pub async fn read(
        &self,
        request: &ReadRequest,
        destination: &mut [u8],
        cancel: &CancellationToken,
    ) -> BridgeResult<u32> {
        let mut attempt = 1;
        loop {
            let outcome = self.attempt(request, destination.len(), cancel).await?;

            match self.policy.decide(attempt, outcome.verification) {
                RetryDecision::Accept => {
                    let start = request.offset();
                    let end = start + outcome.bytes_read as usize;
                    destination[start..end].copy_from_slice(&outcome.shared[start..end]);
                    debug!(
                        task_id = %outcome.task_id,
                        bytes_read = outcome.bytes_read,
                        "unmarshalled read verified"
                    );
                    return Ok(outcome.bytes_read);
                }
                RetryDecision::Retry => {
                    self.metrics.integrity_mismatch();
                    self.report(request, attempt, &outcome);
                    self.metrics.retry();
                    attempt += 1;
                }
                RetryDecision::Fail { retry_matched } => {
                    if retry_matched {
                        warn!(
                            task_id = %outcome.task_id,
                            "retry verified but the read is still failed"
                        );
                    } else {
                        self.metrics.integrity_mismatch();
                        self.report(request, attempt, &outcome);
                    }
                    self.metrics.integrity_failure();
                    return Err(BridgeError::TransferIntegrity {
                        file: request.file,
                        position: request.position,
                        count: request.count,
                        retry_matched,
                    });
                }
            }
        }
    }

    fn report(&self, request: &ReadRequest, attempt: u32, outcome: &AttemptOutcome) {
        self.verifier.report_mismatch(
            request,
            outcome.task_id,
            attempt,
            outcome.verification,
            &outcome.shared,
            &outcome.reference,
        );
    }

    async fn attempt(
        &self,
        request: &ReadRequest,
        capacity: usize,
        cancel: &CancellationToken,
    ) -> BridgeResult<AttemptOutcome> {
        let mut shared = self.pool.acquire(capacity)?;
        let mut reference = self.pool.acquire(capacity)?;
        shared.zero_fill();
        reference.zero_fill();

        let pending = self.registry.begin();
        let task_id = pending.id();
        stamp(&mut shared, task_id);
        stamp(&mut reference, task_id);

        let region = SharedRegion::new(shared);
        self.producer.dispatch_shared_read(
            SharedReadRequest {
                region: region.clone(),
                buffer_offset: request.buffer_offset,
                count: request.count,
                file: request.file,
                position: request.position,
                task_id,
            },
            self.sink.clone(),
        );

        let awaited = self.registry.await_result(pending, cancel).await;
        // Reclaim first; later producer writes must not reach the buffer.
        let shared = region.reclaim();
        let bytes_read = awaited?;

        let shared = shared.ok_or_else(|| {
            BridgeError::transfer(format!("shared region for task {} was lost", task_id))
        })?;
        if bytes_read > request.count {
            return Err(BridgeError::transfer(format!(
                "producer reported {} bytes for a {}-byte read",
                bytes_read, request.count
            )));
        }

        let read = self
            .reference
            .read(request.file, request.position, request.count);
        let bytes = tokio::select! {
            result = read => result?,
            _ = cancel.cancelled() => return Err(BridgeError::Canceled),
        };
        let start = request.offset();
        reference[start..start + bytes.len()].copy_from_slice(&bytes);

        let verification = self
            .verifier
            .verify(&shared, bytes_read, &reference, bytes.len() as u32);

        Ok(AttemptOutcome {
            task_id,
            bytes_read,
            shared,
            reference,
            verification,
        })
    }
}

fn stamp(buffer: &mut [u8], task_id: TaskId) {
    if let Some(first) = buffer.first_mut() {
        *first = task_id.marker();
    }
}
