//! Shared regions handed to the producer for unmarshalled reads.
//!
//! A [`SharedRegion`] wraps a rented buffer that both sides can reach. The
//! producer writes into it; the host later [`reclaim`](SharedRegion::reclaim)s
//! the buffer. After a reclaim the region is invalidated and further producer
//! writes are rejected rather than landing in memory the host already owns.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::PooledBuffer;

/// A buffer shared with the producer side for the duration of one dispatch.
#[derive(Clone)]
pub struct SharedRegion {
    slot: Arc<Mutex<Option<PooledBuffer>>>,
    len: usize,
}

impl SharedRegion {
    /// Share a rented buffer.
    pub fn new(buffer: PooledBuffer) -> Self {
        let len = buffer.len();
        Self {
            slot: Arc::new(Mutex::new(Some(buffer))),
            len,
        }
    }

    /// Length of the region when it was shared.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the region has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true once the host has taken the buffer back.
    pub fn is_invalidated(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Copy `bytes` into the region at `offset`.
    ///
    /// Returns false if the region was invalidated or the write would run
    /// past its end.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> bool {
        self.with_bytes_mut(|region| {
            let Some(end) = offset.checked_add(bytes.len()) else {
                return false;
            };
            match region.get_mut(offset..end) {
                Some(target) => {
                    target.copy_from_slice(bytes);
                    true
                }
                None => false,
            }
        })
        .unwrap_or(false)
    }

    /// Run `f` over the live region contents, or return `None` if invalidated.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        let mut slot = self.slot.lock();
        slot.as_mut().map(|buffer| f(buffer))
    }

    /// Take the buffer back, invalidating every clone of this region.
    ///
    /// Only the first call returns the buffer.
    pub fn reclaim(&self) -> Option<PooledBuffer> {
        self.slot.lock().take()
    }
}

impl fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegion")
            .field("len", &self.len)
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}
