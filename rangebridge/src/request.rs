//! Range read requests.

use serde::Serialize;

use crate::boundary::FileRef;
use crate::error::{BridgeError, BridgeResult};

/// A byte range of a producer resource and where it lands in the destination.
///
/// `position` may lie past the end of the resource; such a read yields zero
/// bytes rather than an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReadRequest {
    /// Resource to read.
    pub file: FileRef,
    /// Byte position within the resource.
    pub position: u64,
    /// Maximum bytes to read.
    pub count: u32,
    /// Offset in the destination buffer.
    pub buffer_offset: u64,
}

impl ReadRequest {
    /// Create a request.
    pub fn new(file: FileRef, position: u64, count: u32, buffer_offset: u64) -> Self {
        Self {
            file,
            position,
            count,
            buffer_offset,
        }
    }

    /// Check the request against a destination of `capacity` bytes.
    ///
    /// `count` is clamped to the capacity remaining after `buffer_offset`.
    /// An offset beyond the destination is rejected.
    pub fn clamped_to(self, capacity: usize) -> BridgeResult<Self> {
        let offset = usize::try_from(self.buffer_offset)
            .ok()
            .filter(|&offset| offset <= capacity)
            .ok_or_else(|| {
                BridgeError::InvalidRequest(format!(
                    "buffer offset {} exceeds destination length {}",
                    self.buffer_offset, capacity
                ))
            })?;

        let remaining = u32::try_from(capacity - offset).unwrap_or(u32::MAX);
        Ok(Self {
            count: self.count.min(remaining),
            ..self
        })
    }

    /// Destination offset as an index.
    ///
    /// Only meaningful after [`clamped_to`](Self::clamped_to) succeeded.
    pub(crate) fn offset(&self) -> usize {
        self.buffer_offset as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_is_clamped_to_remaining_capacity() {
        let request = ReadRequest::new(FileRef(1), 0, 100, 6).clamped_to(10).unwrap();
        assert_eq!(request.count, 4);
        assert_eq!(request.offset(), 6);
    }

    #[test]
    fn test_count_within_capacity_is_unchanged() {
        let request = ReadRequest::new(FileRef(1), 0, 4, 2).clamped_to(10).unwrap();
        assert_eq!(request.count, 4);
    }

    #[test]
    fn test_offset_at_end_yields_zero_count() {
        let request = ReadRequest::new(FileRef(1), 0, 4, 10).clamped_to(10).unwrap();
        assert_eq!(request.count, 0);
    }

    #[test]
    fn test_offset_past_end_is_rejected() {
        let err = ReadRequest::new(FileRef(1), 0, 4, 11)
            .clamped_to(10)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
    }

    #[test]
    fn test_serializes_for_diagnostics() {
        let request = ReadRequest::new(FileRef(7), 512, 64, 0);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"file":7,"position":512,"count":64,"buffer_offset":0}"#
        );
    }
}
