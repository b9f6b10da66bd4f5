//! The producer boundary.
//!
//! The producer is the independently scheduled runtime that actually holds the
//! resources. Everything the transfer core needs from it is expressed by the
//! [`Producer`] trait; everything it needs from the core is the
//! [`CompletionSink`] passed along with each shared-buffer dispatch.
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so a coordinator can hold an
//! `Arc<dyn Producer>` and tests can substitute their own implementation.

mod bootstrap;

pub use bootstrap::{BootstrapConfig, Bootstrapper, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS};

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::correlation::{CompletionSink, TaskId};
use crate::error::BridgeResult;
use crate::pool::SharedRegion;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque handle to a producer-side resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(pub u64);

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to the producer-side element that owns a file collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub String);

impl ElementRef {
    /// Create an element reference.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource metadata as reported by the producer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type, empty if unknown.
    pub content_type: String,
    /// Last modification time in milliseconds since the Unix epoch.
    pub last_modified_ms: u64,
}

/// A shared-buffer read handed to the producer.
#[derive(Clone, Debug)]
pub struct SharedReadRequest {
    /// Region the producer writes into.
    pub region: SharedRegion,
    /// Offset within the region where the bytes go.
    pub buffer_offset: u64,
    /// Maximum number of bytes to write.
    pub count: u32,
    /// Resource to read from.
    pub file: FileRef,
    /// Position within the resource.
    pub position: u64,
    /// Id to report back through the completion sink.
    pub task_id: TaskId,
}

/// Operations the transfer core consumes from the producer runtime.
pub trait Producer: Send + Sync + 'static {
    /// Returns true once the producer runtime can accept calls.
    fn is_ready(&self) -> BoxFuture<'_, bool>;

    /// Inject the producer-side bootstrap. Called at most once per successful
    /// initialization.
    fn inject_bootstrap(&self) -> BoxFuture<'_, BridgeResult<()>>;

    /// Open the `index`-th resource behind `element` for reading.
    fn open_read(&self, element: &ElementRef, index: u32) -> BoxFuture<'_, BridgeResult<FileRef>>;

    /// Describe an open resource.
    fn metadata(&self, file: FileRef) -> BoxFuture<'_, BridgeResult<FileMetadata>>;

    /// Release a producer-side resource. Returns false if it was not open.
    fn dispose(&self, file: FileRef) -> BoxFuture<'_, BridgeResult<bool>>;

    /// Read a range as a base64 payload in a single round trip.
    ///
    /// `None` or an empty string means zero bytes.
    fn read_encoded(
        &self,
        file: FileRef,
        position: u64,
        count: u32,
    ) -> BoxFuture<'_, BridgeResult<Option<String>>>;

    /// Start a shared-buffer read and return immediately.
    ///
    /// The result arrives later through `sink`.
    fn dispatch_shared_read(&self, request: SharedReadRequest, sink: CompletionSink);
}
