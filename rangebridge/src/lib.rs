//! RangeBridge - random-access range reads across an asynchronous producer boundary
//!
//! This library lets a host read arbitrary byte ranges of a file-like resource
//! that lives in an independently scheduled producer runtime. The producer is
//! only reachable through asynchronous calls, so every read is a small RPC:
//!
//! ```text
//! caller ─► Coordinator ─┬─► MarshalledChannel ─────────► bytes
//!                        │     (base64 round trip)
//!                        │
//!                        └─► UnmarshalledChannel ─► verify ─► bytes
//!                              (shared buffer +     │
//!                               out-of-band)        └─► retry once
//! ```
//!
//! # Modules
//!
//! - [`pool`]: pooled transfer buffers
//! - [`correlation`]: task ids paired with pending completions
//! - [`boundary`]: the `Producer` trait and bootstrap/readiness handling
//! - [`channel`]: marshalled and unmarshalled transports plus verification
//! - [`coordinator`]: the public `read_range` entry point
//! - [`stream`]: positioned file streams on top of `read_range`
//! - [`loopback`]: in-process producer used by the CLI and tests
//! - [`telemetry`]: transfer counters
//! - [`config`], [`logging`]: INI settings and subscriber setup

pub mod boundary;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod correlation;
pub mod error;
pub mod logging;
pub mod loopback;
pub mod pool;
pub mod request;
pub mod stream;
pub mod telemetry;

pub use boundary::{ElementRef, FileMetadata, FileRef, Producer};
pub use coordinator::{TransferConfig, TransferCoordinator, TransportMode};
pub use error::{BridgeError, BridgeResult};
pub use request::ReadRequest;
pub use stream::FileStream;

/// Crate version, as reported by the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
