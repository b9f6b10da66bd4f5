//! Seekable read handle over a producer-side resource.
//!
//! A [`FileStream`] tracks a position and turns each `read` into one
//! [`TransferCoordinator::read_range`] call. The resource is disposed by
//! [`FileStream::close`], or on drop when a tokio runtime is available.

use std::io::SeekFrom;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::boundary::{FileMetadata, FileRef};
use crate::coordinator::TransferCoordinator;
use crate::error::{BridgeError, BridgeResult};
use crate::request::ReadRequest;

/// An open resource with a read position.
pub struct FileStream {
    coordinator: Arc<TransferCoordinator>,
    file: FileRef,
    metadata: FileMetadata,
    position: u64,
    closed: bool,
}

impl FileStream {
    pub(crate) fn new(
        coordinator: Arc<TransferCoordinator>,
        file: FileRef,
        metadata: FileMetadata,
    ) -> Self {
        Self {
            coordinator,
            file,
            metadata,
            position: 0,
            closed: false,
        }
    }

    /// Producer-side handle.
    pub fn file(&self) -> FileRef {
        self.file
    }

    /// Metadata captured when the stream was opened.
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Size in bytes at open time.
    pub fn len(&self) -> u64 {
        self.metadata.size
    }

    /// Returns true if the resource was empty at open time.
    pub fn is_empty(&self) -> bool {
        self.metadata.size == 0
    }

    /// Current read position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// Returns 0 at end of file. The position advances by the bytes read.
    pub async fn read(
        &mut self,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> BridgeResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let count = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let request = ReadRequest::new(self.file, self.position, count, 0);
        let n = self.coordinator.read_range(request, buf, cancel).await?;
        self.position += u64::from(n);
        Ok(n as usize)
    }

    /// Move the read position. Seeking past the end is allowed.
    pub fn seek(&mut self, pos: SeekFrom) -> BridgeResult<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.metadata.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            BridgeError::InvalidRequest(format!(
                "seek {:?} from {} leaves the valid range",
                pos, self.position
            ))
        })?;
        self.position = target;
        Ok(target)
    }

    /// Read from the current position to end of file in configured chunks.
    pub async fn read_to_end(&mut self, cancel: &CancellationToken) -> BridgeResult<Vec<u8>> {
        let chunk_size = self.coordinator.config().chunk_size();
        let remaining = self.metadata.size.saturating_sub(self.position) as usize;
        let mut out = Vec::with_capacity(remaining);
        let mut chunk = vec![0u8; chunk_size];

        loop {
            let n = self.read(&mut chunk, cancel).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }

        debug!(file = %self.file, bytes = out.len(), "read to end");
        Ok(out)
    }

    /// Dispose the producer-side resource. Returns false if it was already gone.
    pub async fn close(mut self) -> BridgeResult<bool> {
        self.closed = true;
        self.coordinator.dispose(self.file).await
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let file = self.file;
        match Handle::try_current() {
            Ok(handle) => {
                let coordinator = Arc::clone(&self.coordinator);
                handle.spawn(async move {
                    if let Err(e) = coordinator.dispose(file).await {
                        debug!(%file, error = %e, "dispose on drop failed");
                    }
                });
            }
            Err(_) => warn!(%file, "file stream dropped outside a runtime; not disposed"),
        }
    }
}
