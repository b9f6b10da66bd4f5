//! Encoded (marshalled) transport.
//!
//! The producer answers a range read with a base64 string. An absent or empty
//! payload means the range lies entirely past the end of the resource.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use tracing::trace;

use crate::boundary::{FileRef, Producer};
use crate::error::{BridgeError, BridgeResult};

/// Decode a producer payload into raw bytes.
pub fn decode_payload(payload: Option<&str>) -> BridgeResult<Vec<u8>> {
    match payload {
        None | Some("") => Ok(Vec::new()),
        Some(text) => STANDARD
            .decode(text)
            .map_err(|e| BridgeError::transfer(format!("invalid base64 payload: {}", e))),
    }
}

/// Encode bytes as a producer payload. Zero bytes encode as `None`.
pub fn encode_payload(bytes: &[u8]) -> Option<String> {
    (!bytes.is_empty()).then(|| STANDARD.encode(bytes))
}

/// Range reads over the encoded round trip.
#[derive(Clone)]
pub struct MarshalledChannel {
    producer: Arc<dyn Producer>,
}

impl MarshalledChannel {
    /// Create a channel talking to `producer`.
    pub fn new(producer: Arc<dyn Producer>) -> Self {
        Self { producer }
    }

    /// Read up to `count` bytes at `position`.
    ///
    /// The returned length is the number of bytes read and never exceeds
    /// `count`.
    pub async fn read(&self, file: FileRef, position: u64, count: u32) -> BridgeResult<Bytes> {
        let payload = self.producer.read_encoded(file, position, count).await?;
        let bytes = decode_payload(payload.as_deref())?;

        if bytes.len() > count as usize {
            return Err(BridgeError::transfer(format!(
                "producer returned {} bytes for a {}-byte read",
                bytes.len(),
                count
            )));
        }

        trace!(%file, position, count, bytes_read = bytes.len(), "marshalled read");
        Ok(Bytes::from(bytes))
    }
}
