//! Pooled transfer buffers.
//!
//! Each channel invocation rents its buffers from a [`BufferPool`] and gives
//! them back when the invocation ends. Buffers are returned by dropping the
//! [`PooledBuffer`] guard, so every exit path (success, error, cancellation)
//! releases exactly once. Releasing twice cannot be expressed because
//! [`BufferPool::release`] consumes the guard.
//!
//! # Contents
//!
//! A rented buffer has exactly the requested length, but its contents are
//! whatever the previous renter left behind. Callers that compare buffers
//! must call [`PooledBuffer::zero_fill`] first.
//!
//! ```text
//! acquire(size) ──► free list hit? ──► yes ──► reuse (stale bytes)
//!                          │
//!                          └─ no ──► allocate fresh
//!
//! drop / release ──► free list (bounded per size and in total bytes)
//!                      or deallocate
//! ```

mod shared;

pub use shared::SharedRegion;

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{BridgeError, BridgeResult};

/// Default limit on buffers rented at the same time.
pub const DEFAULT_MAX_OUTSTANDING: usize = 256;

/// Default number of idle buffers kept per distinct size.
pub const DEFAULT_MAX_IDLE_PER_SIZE: usize = 8;

/// Default cap on idle bytes kept across all sizes (64MB).
pub const DEFAULT_MAX_IDLE_BYTES: usize = 64 * 1024 * 1024;

/// Configuration for the buffer pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of buffers rented at once.
    pub max_outstanding: usize,

    /// Maximum number of idle buffers retained for each size.
    pub max_idle_per_size: usize,

    /// Maximum idle bytes retained across all sizes.
    pub max_idle_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_outstanding: DEFAULT_MAX_OUTSTANDING,
            max_idle_per_size: DEFAULT_MAX_IDLE_PER_SIZE,
            max_idle_bytes: DEFAULT_MAX_IDLE_BYTES,
        }
    }
}

impl PoolConfig {
    /// Set the outstanding buffer limit.
    pub fn with_max_outstanding(mut self, max_outstanding: usize) -> Self {
        self.max_outstanding = max_outstanding;
        self
    }

    /// Set the idle byte cap.
    pub fn with_max_idle_bytes(mut self, max_idle_bytes: usize) -> Self {
        self.max_idle_bytes = max_idle_bytes;
        self
    }
}

/// Point-in-time pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers currently rented.
    pub outstanding: usize,
    /// Total successful rentals.
    pub rented: u64,
    /// Total returns.
    pub returned: u64,
    /// Rentals served from the free list.
    pub reused: u64,
    /// Bytes held on the free list.
    pub idle_bytes: usize,
}

/// Idle buffers keyed by length, with their byte total.
#[derive(Default)]
struct FreeList {
    by_size: HashMap<usize, Vec<Vec<u8>>>,
    idle_bytes: usize,
}

impl FreeList {
    fn pop(&mut self, size: usize) -> Option<Vec<u8>> {
        let idle = self.by_size.get_mut(&size)?;
        let data = idle.pop()?;
        if idle.is_empty() {
            self.by_size.remove(&size);
        }
        self.idle_bytes -= data.len();
        Some(data)
    }

    fn push(&mut self, data: Vec<u8>, config: &PoolConfig) -> bool {
        let size = data.len();
        if self.idle_bytes.saturating_add(size) > config.max_idle_bytes {
            return false;
        }
        let idle = self.by_size.entry(size).or_default();
        if idle.len() >= config.max_idle_per_size {
            return false;
        }
        idle.push(data);
        self.idle_bytes += size;
        true
    }
}

struct PoolInner {
    free: Mutex<FreeList>,
    outstanding: AtomicUsize,
    rented: AtomicU64,
    returned: AtomicU64,
    reused: AtomicU64,
    config: PoolConfig,
}

impl PoolInner {
    fn give_back(&self, data: Vec<u8>) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "buffer returned to a pool with none outstanding");
        self.returned.fetch_add(1, Ordering::Relaxed);

        let size = data.len();
        if !self.free.lock().push(data, &self.config) {
            trace!(size, "idle limit reached, buffer deallocated");
        }
    }
}

/// Rents and recycles fixed-size byte buffers.
///
/// Cloning a pool yields another handle to the same free lists and counters.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool with the given configuration.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(FreeList::default()),
                outstanding: AtomicUsize::new(0),
                rented: AtomicU64::new(0),
                returned: AtomicU64::new(0),
                reused: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Rent a buffer of exactly `size` bytes.
    ///
    /// Contents are unspecified. Fails with [`BridgeError::PoolExhausted`]
    /// when the outstanding limit is reached.
    pub fn acquire(&self, size: usize) -> BridgeResult<PooledBuffer> {
        let limit = self.inner.config.max_outstanding;
        self.inner
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map_err(|outstanding| BridgeError::PoolExhausted { outstanding, limit })?;
        self.inner.rented.fetch_add(1, Ordering::Relaxed);

        let recycled = self.inner.free.lock().pop(size);

        let data = match recycled {
            Some(data) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                data
            }
            None => vec![0u8; size],
        };

        trace!(size, "rented transfer buffer");
        Ok(PooledBuffer {
            data,
            pool: Some(Arc::clone(&self.inner)),
        })
    }

    /// Return a buffer to the pool.
    ///
    /// Equivalent to dropping the guard, except that a buffer rented from a
    /// different pool is reported as [`BridgeError::ForeignBuffer`] (it still
    /// goes back to its own pool).
    pub fn release(&self, buffer: PooledBuffer) -> BridgeResult<()> {
        let owned = buffer
            .pool
            .as_ref()
            .is_some_and(|pool| Arc::ptr_eq(pool, &self.inner));
        drop(buffer);
        if owned {
            Ok(())
        } else {
            Err(BridgeError::ForeignBuffer)
        }
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            outstanding: self.inner.outstanding.load(Ordering::Acquire),
            rented: self.inner.rented.load(Ordering::Relaxed),
            returned: self.inner.returned.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
            idle_bytes: self.inner.free.lock().idle_bytes,
        }
    }

    /// Number of buffers currently rented.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A rented buffer. Dropping it returns the storage to its pool.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Option<Arc<PoolInner>>,
}

impl PooledBuffer {
    /// Overwrite every byte with zero.
    pub fn zero_fill(&mut self) {
        self.data.fill(0);
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.give_back(std::mem::take(&mut self.data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_acquire_returns_requested_size() {
        let pool = BufferPool::default();
        let buffer = pool.acquire(4096).unwrap();
        assert_eq!(buffer.len(), 4096);
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn test_zero_fill_clears_stale_contents() {
        let pool = BufferPool::default();
        let mut first = pool.acquire(16).unwrap();
        first.fill(0xAB);
        drop(first);

        let mut second = pool.acquire(16).unwrap();
        assert_eq!(pool.stats().reused, 1);
        second.zero_fill();
        assert!(second.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_drop_returns_buffer() {
        let pool = BufferPool::default();
        {
            let _a = pool.acquire(8).unwrap();
            let _b = pool.acquire(8).unwrap();
            assert_eq!(pool.outstanding(), 2);
        }
        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.rented, 2);
        assert_eq!(stats.returned, 2);
    }

    #[test]
    fn test_exhaustion_fails_immediately() {
        let pool = BufferPool::new(PoolConfig::default().with_max_outstanding(1));
        let _held = pool.acquire(8).unwrap();

        let err = pool.acquire(8).unwrap_err();
        assert_eq!(
            err,
            BridgeError::PoolExhausted {
                outstanding: 1,
                limit: 1
            }
        );
    }

    #[test]
    fn test_release_into_foreign_pool_is_detected() {
        let pool_a = BufferPool::default();
        let pool_b = BufferPool::default();
        let buffer = pool_a.acquire(8).unwrap();

        assert_eq!(pool_b.release(buffer), Err(BridgeError::ForeignBuffer));
        // The buffer still went home.
        assert_eq!(pool_a.outstanding(), 0);
        assert_eq!(pool_b.stats().returned, 0);
    }

    #[test]
    fn test_release_into_owner() {
        let pool = BufferPool::default();
        let buffer = pool.acquire(8).unwrap();
        assert!(pool.release(buffer).is_ok());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_idle_list_is_bounded() {
        let config = PoolConfig {
            max_outstanding: 16,
            max_idle_per_size: 2,
            ..PoolConfig::default()
        };
        let pool = BufferPool::new(config);
        let buffers: Vec<_> = (0..5).map(|_| pool.acquire(32).unwrap()).collect();
        drop(buffers);

        assert_eq!(pool.inner.free.lock().by_size.get(&32).map(Vec::len), Some(2));
        assert_eq!(pool.stats().idle_bytes, 64);
    }

    #[test]
    fn test_idle_bytes_are_capped_across_sizes() {
        let pool = BufferPool::new(PoolConfig::default().with_max_idle_bytes(10 * 1024));

        for kib in 1..=200usize {
            drop(pool.acquire(kib * 1024).unwrap());
        }

        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.returned, 200);
        assert!(stats.idle_bytes <= 10 * 1024, "idle_bytes = {}", stats.idle_bytes);
        // 1 + 2 + 3 + 4 KiB fit; 5 KiB would exceed the cap.
        assert_eq!(stats.idle_bytes, 10 * 1024);
    }

    #[test]
    fn test_reuse_releases_idle_bytes() {
        let pool = BufferPool::default();
        drop(pool.acquire(128).unwrap());
        assert_eq!(pool.stats().idle_bytes, 128);

        let _held = pool.acquire(128).unwrap();
        assert_eq!(pool.stats().idle_bytes, 0);
        assert!(pool.inner.free.lock().by_size.is_empty());
    }

    proptest! {
        #[test]
        fn prop_acquire_size_and_zero_fill(size in 0usize..8192, fill in any::<u8>()) {
            let pool = BufferPool::default();
            let mut stale = pool.acquire(size).unwrap();
            stale.fill(fill);
            drop(stale);

            let mut buffer = pool.acquire(size).unwrap();
            prop_assert_eq!(buffer.len(), size);
            buffer.zero_fill();
            prop_assert!(buffer.iter().all(|&b| b == 0));
        }
    }
}
