//! In-process producer.
//!
//! [`LoopbackProducer`] hosts resources in memory and answers both transports
//! the way a real producer runtime would: encoded reads synchronously, shared
//! reads on a spawned task that signals the [`CompletionSink`] later.
//!
//! It also exposes the fault knobs needed to exercise the verification path:
//!
//! | Knob | Effect |
//! |------|--------|
//! | `corrupt_next_shared_reads(n)` | Damage the region after writing it |
//! | `fail_next_shared_reads(n, msg)` | Signal `on_read_failed` instead |
//! | `set_completion_delay(file, d)` | Hold a file's completion back by `d` |
//! | `ready_after_polls(n)` / `never_ready()` | Readiness simulation |

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::boundary::{BoxFuture, ElementRef, FileMetadata, FileRef, Producer, SharedReadRequest};
use crate::channel::encode_payload;
use crate::correlation::CompletionSink;
use crate::error::{BridgeError, BridgeResult};

/// A resource hosted by the loopback producer.
#[derive(Clone, Debug)]
struct Resource {
    metadata: FileMetadata,
    content: Bytes,
}

impl Resource {
    fn new(name: String, content: Bytes, last_modified_ms: u64) -> Self {
        Self {
            metadata: FileMetadata {
                name,
                size: content.len() as u64,
                content_type: String::new(),
                last_modified_ms,
            },
            content,
        }
    }

    fn slice(&self, position: u64, count: u32) -> Bytes {
        let len = self.content.len() as u64;
        let start = position.min(len) as usize;
        let end = position.saturating_add(u64::from(count)).min(len) as usize;
        self.content.slice(start..end)
    }
}

#[derive(Clone, Copy, Debug)]
enum Readiness {
    Ready,
    AfterPolls(u32),
    Never,
}

struct LoopbackInner {
    elements: DashMap<ElementRef, Vec<Resource>>,
    open: DashMap<FileRef, Resource>,
    next_file: AtomicU64,
    readiness: Mutex<Readiness>,
    injections: AtomicU32,
    corrupt_next: AtomicUsize,
    fail_next: Mutex<Option<(usize, String)>>,
    delays: DashMap<FileRef, Duration>,
    shared_dispatches: AtomicU64,
    encoded_reads: AtomicU64,
}

impl LoopbackInner {
    fn resource(&self, file: FileRef) -> BridgeResult<Resource> {
        self.open
            .get(&file)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BridgeError::transfer(format!("file {} is not open", file)))
    }

    fn take_failure(&self) -> Option<String> {
        let mut slot = self.fail_next.lock();
        let (remaining, message) = slot.as_mut()?;
        let message = message.clone();
        *remaining -= 1;
        if *remaining == 0 {
            *slot = None;
        }
        Some(message)
    }

    fn take_corruption(&self) -> bool {
        self.corrupt_next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn serve_shared(&self, request: &SharedReadRequest) -> Result<u32, String> {
        if let Some(message) = self.take_failure() {
            return Err(message);
        }

        let resource = self
            .open
            .get(&request.file)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| format!("file {} is not open", request.file))?;
        let bytes = resource.slice(request.position, request.count);
        let offset = usize::try_from(request.buffer_offset)
            .map_err(|_| "buffer offset out of range".to_string())?;

        if !request.region.write_at(offset, &bytes) {
            return Err("shared region is no longer valid".to_string());
        }

        if self.take_corruption() {
            request.region.with_bytes_mut(|region| {
                if let Some(last) = region.last_mut() {
                    *last = !*last;
                }
            });
            debug!(task_id = %request.task_id, "corrupted shared region");
        }

        Ok(bytes.len() as u32)
    }
}

/// In-memory producer with fault injection.
///
/// Cloning yields another handle to the same resources and knobs.
#[derive(Clone)]
pub struct LoopbackProducer {
    inner: Arc<LoopbackInner>,
}

impl LoopbackProducer {
    /// Create an empty, ready producer.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LoopbackInner {
                elements: DashMap::new(),
                open: DashMap::new(),
                next_file: AtomicU64::new(1),
                readiness: Mutex::new(Readiness::Ready),
                injections: AtomicU32::new(0),
                corrupt_next: AtomicUsize::new(0),
                fail_next: Mutex::new(None),
                delays: DashMap::new(),
                shared_dispatches: AtomicU64::new(0),
                encoded_reads: AtomicU64::new(0),
            }),
        }
    }

    /// Append a resource to `element`'s collection. Returns its index.
    pub fn add_file(
        &self,
        element: &ElementRef,
        name: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> u32 {
        self.push_resource(element, Resource::new(name.into(), content.into(), 0))
    }

    /// Append a local file to `element`'s collection. Returns its index.
    pub async fn add_path(&self, element: &ElementRef, path: &Path) -> std::io::Result<u32> {
        let content = tokio::fs::read(path).await?;
        let last_modified_ms = tokio::fs::metadata(path)
            .await?
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_millis() as u64)
            .unwrap_or(0);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let resource = Resource::new(name, Bytes::from(content), last_modified_ms);
        Ok(self.push_resource(element, resource))
    }

    fn push_resource(&self, element: &ElementRef, resource: Resource) -> u32 {
        let mut files = self.inner.elements.entry(element.clone()).or_default();
        files.push(resource);
        (files.len() - 1) as u32
    }

    /// Register an already-open resource and return its handle.
    pub fn open_bytes(&self, name: impl Into<String>, content: impl Into<Bytes>) -> FileRef {
        self.register(Resource::new(name.into(), content.into(), 0))
    }

    fn register(&self, resource: Resource) -> FileRef {
        let file = FileRef(self.inner.next_file.fetch_add(1, Ordering::Relaxed));
        self.inner.open.insert(file, resource);
        file
    }

    /// Damage the next `n` shared-buffer reads after they are written.
    pub fn corrupt_next_shared_reads(&self, n: usize) {
        self.inner.corrupt_next.store(n, Ordering::Release);
    }

    /// Fail the next `n` shared-buffer reads with `message`.
    pub fn fail_next_shared_reads(&self, n: usize, message: impl Into<String>) {
        *self.inner.fail_next.lock() = (n > 0).then(|| (n, message.into()));
    }

    /// Delay completion signals for `file` by `delay`.
    pub fn set_completion_delay(&self, file: FileRef, delay: Duration) {
        self.inner.delays.insert(file, delay);
    }

    /// Report not-ready for the next `polls` readiness checks.
    pub fn ready_after_polls(&self, polls: u32) {
        *self.inner.readiness.lock() = if polls == 0 {
            Readiness::Ready
        } else {
            Readiness::AfterPolls(polls)
        };
    }

    /// Never report ready.
    pub fn never_ready(&self) {
        *self.inner.readiness.lock() = Readiness::Never;
    }

    /// Number of bootstrap injections so far.
    pub fn bootstrap_injections(&self) -> u32 {
        self.inner.injections.load(Ordering::Relaxed)
    }

    /// Number of shared-buffer dispatches so far.
    pub fn shared_dispatches(&self) -> u64 {
        self.inner.shared_dispatches.load(Ordering::Relaxed)
    }

    /// Number of encoded reads so far.
    pub fn encoded_reads(&self) -> u64 {
        self.inner.encoded_reads.load(Ordering::Relaxed)
    }

    /// Returns true if `file` is open.
    pub fn is_open(&self, file: FileRef) -> bool {
        self.inner.open.contains_key(&file)
    }
}

impl Default for LoopbackProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Producer for LoopbackProducer {
    fn is_ready(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let mut readiness = self.inner.readiness.lock();
            match *readiness {
                Readiness::Ready => true,
                Readiness::Never => false,
                Readiness::AfterPolls(remaining) => {
                    *readiness = if remaining <= 1 {
                        Readiness::Ready
                    } else {
                        Readiness::AfterPolls(remaining - 1)
                    };
                    false
                }
            }
        })
    }

    fn inject_bootstrap(&self) -> BoxFuture<'_, BridgeResult<()>> {
        Box::pin(async move {
            self.inner.injections.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }

    fn open_read(&self, element: &ElementRef, index: u32) -> BoxFuture<'_, BridgeResult<FileRef>> {
        let element = element.clone();
        Box::pin(async move {
            let resource = self
                .inner
                .elements
                .get(&element)
                .and_then(|files| files.get(index as usize).cloned())
                .ok_or_else(|| {
                    BridgeError::transfer(format!(
                        "element {} has no file at index {}",
                        element, index
                    ))
                })?;
            let file = self.register(resource);
            debug!(%element, index, %file, "opened resource");
            Ok(file)
        })
    }

    fn metadata(&self, file: FileRef) -> BoxFuture<'_, BridgeResult<FileMetadata>> {
        Box::pin(async move { Ok(self.inner.resource(file)?.metadata) })
    }

    fn dispose(&self, file: FileRef) -> BoxFuture<'_, BridgeResult<bool>> {
        Box::pin(async move {
            let removed = self.inner.open.remove(&file).is_some();
            debug!(%file, removed, "disposed resource");
            Ok(removed)
        })
    }

    fn read_encoded(
        &self,
        file: FileRef,
        position: u64,
        count: u32,
    ) -> BoxFuture<'_, BridgeResult<Option<String>>> {
        Box::pin(async move {
            self.inner.encoded_reads.fetch_add(1, Ordering::Relaxed);
            let resource = self.inner.resource(file)?;
            Ok(encode_payload(&resource.slice(position, count)))
        })
    }

    fn dispatch_shared_read(&self, request: SharedReadRequest, sink: CompletionSink) {
        self.inner.shared_dispatches.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let delay = inner.delays.get(&request.file).map(|d| *d.value());

        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match inner.serve_shared(&request) {
                Ok(bytes_read) => {
                    trace!(task_id = %request.task_id, bytes_read, "shared read served");
                    sink.on_read_completed(request.task_id, bytes_read);
                }
                Err(message) => sink.on_read_failed(request.task_id, &message),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::decode_payload;

    #[tokio::test]
    async fn test_open_read_by_element_index() {
        let producer = LoopbackProducer::new();
        let element = ElementRef::new("input-1");
        producer.add_file(&element, "a.txt", &b"alpha"[..]);
        let index = producer.add_file(&element, "b.txt", &b"beta"[..]);
        assert_eq!(index, 1);

        let file = producer.open_read(&element, 1).await.unwrap();
        let metadata = producer.metadata(file).await.unwrap();
        assert_eq!(metadata.name, "b.txt");
        assert_eq!(metadata.size, 4);
    }

    #[tokio::test]
    async fn test_open_read_missing_index_fails() {
        let producer = LoopbackProducer::new();
        let element = ElementRef::new("input-1");
        let err = producer.open_read(&element, 0).await.unwrap_err();
        assert!(matches!(err, BridgeError::Transfer { .. }));
    }

    #[tokio::test]
    async fn test_dispose_closes_once() {
        let producer = LoopbackProducer::new();
        let file = producer.open_bytes("x", &b"x"[..]);
        assert!(producer.dispose(file).await.unwrap());
        assert!(!producer.dispose(file).await.unwrap());
        assert!(!producer.is_open(file));
    }

    #[tokio::test]
    async fn test_encoded_read_round_trips_range() {
        let producer = LoopbackProducer::new();
        let file = producer.open_bytes("x", &b"0123456789"[..]);
        let payload = producer.read_encoded(file, 3, 4).await.unwrap();
        assert_eq!(decode_payload(payload.as_deref()).unwrap(), b"3456");

        let past_end = producer.read_encoded(file, 10, 4).await.unwrap();
        assert_eq!(past_end, None);
    }

    #[tokio::test]
    async fn test_add_path_reads_local_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("local.bin");
        std::fs::write(&path, b"from disk").unwrap();

        let producer = LoopbackProducer::new();
        let element = ElementRef::new("files");
        let index = producer.add_path(&element, &path).await.unwrap();
        let file = producer.open_read(&element, index).await.unwrap();
        let metadata = producer.metadata(file).await.unwrap();

        assert_eq!(metadata.name, "local.bin");
        assert_eq!(metadata.size, 9);
        assert!(metadata.last_modified_ms > 0);
    }

    #[test]
    fn test_failure_knob_counts_down() {
        let producer = LoopbackProducer::new();
        producer.fail_next_shared_reads(2, "boom");
        assert_eq!(producer.inner.take_failure().as_deref(), Some("boom"));
        assert_eq!(producer.inner.take_failure().as_deref(), Some("boom"));
        assert_eq!(producer.inner.take_failure(), None);
    }
}
