//! Transfer coordinator: the public range-read entry point.
//!
//! The coordinator owns every piece of per-process state (correlation
//! registry, buffer pool, bootstrap guard, metrics) and picks one transport
//! for its whole lifetime. It has no retries of its own; all retrying happens
//! inside the unmarshalled channel.
//!
//! # Lifecycle
//!
//! ```text
//! new(config, producer) ──► read_range / open_read / dispose ... ──► shutdown()
//!                               │
//!                               └─ first call runs ensure_initialized()
//! ```
//!
//! After [`shutdown`](TransferCoordinator::shutdown) every pending waiter is
//! released with [`BridgeError::Canceled`] and new calls fail with
//! [`BridgeError::ShutDown`].
//!
//! # Example
//!
//! ```ignore
//! use rangebridge::{ReadRequest, TransferConfig, TransferCoordinator, TransportMode};
//!
//! let config = TransferConfig::default().with_transport(TransportMode::Unmarshalled);
//! let coordinator = TransferCoordinator::new(config, producer);
//!
//! let mut buffer = vec![0u8; 4096];
//! let request = ReadRequest::new(file, 0, 4096, 0);
//! let n = coordinator.read_range(request, &mut buffer, &cancel).await?;
//! ```

mod config;

pub use config::{TransferConfig, TransportMode, DEFAULT_CHUNK_SIZE};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::boundary::{Bootstrapper, ElementRef, FileMetadata, FileRef, Producer};
use crate::channel::{MarshalledChannel, UnmarshalledChannel};
use crate::correlation::{CompletionSink, CorrelationRegistry};
use crate::error::{BridgeError, BridgeResult};
use crate::pool::{BufferPool, PoolStats};
use crate::request::ReadRequest;
use crate::stream::FileStream;
use crate::telemetry::{TransferMetrics, TransferSnapshot};

/// Drives range reads over the configured transport.
pub struct TransferCoordinator {
    config: TransferConfig,
    producer: Arc<dyn Producer>,
    registry: Arc<CorrelationRegistry>,
    pool: BufferPool,
    bootstrap: Bootstrapper,
    marshalled: MarshalledChannel,
    unmarshalled: UnmarshalledChannel,
    metrics: Arc<TransferMetrics>,
    shutdown: CancellationToken,
}

impl TransferCoordinator {
    /// Create a coordinator for `producer`.
    pub fn new(config: TransferConfig, producer: Arc<dyn Producer>) -> Self {
        let registry = Arc::new(CorrelationRegistry::new());
        let pool = BufferPool::new(config.pool.clone());
        let metrics = Arc::new(TransferMetrics::new());

        info!(
            transport = %config.transport,
            max_outstanding_buffers = config.pool.max_outstanding,
            chunk_size = config.chunk_size(),
            "created transfer coordinator"
        );

        Self {
            bootstrap: Bootstrapper::new(config.bootstrap.clone()),
            marshalled: MarshalledChannel::new(Arc::clone(&producer)),
            unmarshalled: UnmarshalledChannel::new(
                Arc::clone(&producer),
                Arc::clone(&registry),
                pool.clone(),
                Arc::clone(&metrics),
            ),
            config,
            producer,
            registry,
            pool,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }

    /// The configuration this coordinator was built with.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// The transport used for every read.
    pub fn transport(&self) -> TransportMode {
        self.config.transport
    }

    /// Inbound completion signals routed to this coordinator's registry.
    pub fn completion_sink(&self) -> CompletionSink {
        CompletionSink::new(Arc::clone(&self.registry))
    }

    /// Bootstrap the producer if that has not happened yet.
    pub async fn ensure_initialized(&self) -> BridgeResult<()> {
        self.check_running()?;
        self.bootstrap.ensure_initialized(self.producer.as_ref()).await
    }

    /// Read `request` into `destination` and return the number of bytes read.
    ///
    /// `count` is clamped to the room left in `destination` after
    /// `buffer_offset`. On failure, any bytes already written to
    /// `destination` must not be trusted.
    pub async fn read_range(
        &self,
        request: ReadRequest,
        destination: &mut [u8],
        cancel: &CancellationToken,
    ) -> BridgeResult<u32> {
        let request = request.clamped_to(destination.len())?;
        self.ensure_initialized().await?;

        let transport = self.config.transport;
        self.metrics.read_started(transport);
        debug!(
            %transport,
            file = %request.file,
            position = request.position,
            count = request.count,
            buffer_offset = request.buffer_offset,
            "read_range"
        );

        // Fires on caller cancellation or shutdown.
        let call = self.shutdown.child_token();
        let read = self.dispatch(transport, &request, destination, &call);
        tokio::pin!(read);
        let result = tokio::select! {
            biased;
            result = &mut read => result,
            _ = cancel.cancelled() => {
                call.cancel();
                read.await
            }
        };

        match &result {
            Ok(bytes_read) => {
                debug_assert!(*bytes_read <= request.count);
                self.metrics.read_succeeded(*bytes_read);
            }
            Err(BridgeError::Canceled) => self.metrics.canceled(),
            Err(BridgeError::TransferIntegrity { .. }) => {}
            Err(_) => self.metrics.transfer_failure(),
        }
        result
    }

    async fn dispatch(
        &self,
        transport: TransportMode,
        request: &ReadRequest,
        destination: &mut [u8],
        cancel: &CancellationToken,
    ) -> BridgeResult<u32> {
        match transport {
            TransportMode::Marshalled => self.read_marshalled(request, destination, cancel).await,
            TransportMode::Unmarshalled => {
                self.unmarshalled.read(request, destination, cancel).await
            }
        }
    }

    async fn read_marshalled(
        &self,
        request: &ReadRequest,
        destination: &mut [u8],
        cancel: &CancellationToken,
    ) -> BridgeResult<u32> {
        let read = self
            .marshalled
            .read(request.file, request.position, request.count);
        let bytes = tokio::select! {
            result = read => result?,
            _ = cancel.cancelled() => return Err(BridgeError::Canceled),
        };
        let start = request.offset();
        destination[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len() as u32)
    }

    /// Open the `index`-th resource behind `element` as a stream.
    pub async fn open_read(
        self: &Arc<Self>,
        element: &ElementRef,
        index: u32,
    ) -> BridgeResult<FileStream> {
        self.ensure_initialized().await?;
        let file = self.producer.open_read(element, index).await?;
        let metadata = match self.producer.metadata(file).await {
            Ok(metadata) => metadata,
            Err(e) => {
                let _ = self.producer.dispose(file).await;
                return Err(e);
            }
        };
        info!(%element, index, %file, size = metadata.size, name = %metadata.name, "opened file");
        Ok(FileStream::new(Arc::clone(self), file, metadata))
    }

    /// Describe an open resource.
    pub async fn metadata(&self, file: FileRef) -> BridgeResult<FileMetadata> {
        self.ensure_initialized().await?;
        self.producer.metadata(file).await
    }

    /// Release a producer-side resource.
    pub async fn dispose(&self, file: FileRef) -> BridgeResult<bool> {
        self.ensure_initialized().await?;
        let disposed = self.producer.dispose(file).await?;
        debug!(%file, disposed, "disposed file");
        Ok(disposed)
    }

    /// Release every pending waiter and refuse further calls.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let released = self.registry.cancel_all();
        info!(released, "transfer coordinator shut down");
    }

    /// Returns true after [`shutdown`](Self::shutdown).
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn check_running(&self) -> BridgeResult<()> {
        if self.shutdown.is_cancelled() {
            Err(BridgeError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Current transfer counters.
    pub fn metrics(&self) -> TransferSnapshot {
        self.metrics.snapshot(self.registry.unknown_completions())
    }

    /// Current buffer pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Number of shared-buffer reads awaiting completion.
    pub fn pending_completions(&self) -> usize {
        self.registry.pending_count()
    }
}
