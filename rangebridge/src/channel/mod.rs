//! Transports that move a byte range across the producer boundary.
//!
//! - [`MarshalledChannel`]: one request/response round trip carrying a base64
//!   payload. Always correct; pays roughly 33% size inflation plus decoding.
//! - [`UnmarshalledChannel`]: the producer writes straight into a shared
//!   buffer and reports completion out of band. Cheaper, but the shared
//!   region is not trustworthy, so every result is checked against a
//!   marshalled reference read by the [`IntegrityVerifier`] under a
//!   [`RetryPolicy`].

mod marshalled;
mod unmarshalled;
mod verify;

pub use marshalled::{decode_payload, encode_payload, MarshalledChannel};
pub use unmarshalled::UnmarshalledChannel;
pub use verify::{IntegrityVerifier, RetryDecision, RetryPolicy, Verification, DEFAULT_MAX_ATTEMPTS};
