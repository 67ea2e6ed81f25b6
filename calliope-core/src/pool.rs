//! Byte buffer pooling.
//!
//! Page payloads are short-lived and allocated at a high rate while
//! streaming, so their backing storage is rented from a pool and returned
//! automatically when the owning page is dropped.

use std::collections::VecDeque;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

struct PoolInner {
    free: VecDeque<Vec<u8>>,
    max_retained: usize,
    total_allocated: usize,
}

/// A pool of reusable byte buffers.
///
/// Cloning the pool produces another handle to the same storage, so a pool
/// can be shared between a source thread and the decoder. Buffers return to
/// the pool when dropped; at most `max_retained` free buffers are kept.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Mutex<PoolInner>>,
}

impl BufferPool {
    /// Create a pool retaining at most `max_retained` free buffers.
    pub fn new(max_retained: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                free: VecDeque::with_capacity(max_retained),
                max_retained,
                total_allocated: 0,
            })),
        }
    }

    /// Rent a zero-initialized buffer of exactly `len` bytes.
    ///
    /// Reuses a free buffer when one is available, growing it as needed;
    /// allocates otherwise.
    pub fn rent(&self, len: usize) -> PooledBuffer {
        let mut data = {
            let mut inner = self.inner.lock();
            match inner.free.pop_front() {
                Some(buf) => buf,
                None => {
                    inner.total_allocated += 1;
                    Vec::new()
                }
            }
        };
        data.clear();
        data.resize(len, 0);
        PooledBuffer {
            data,
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Number of free buffers currently held.
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Total number of buffers ever allocated by this pool.
    pub fn total_allocated(&self) -> usize {
        self.inner.lock().total_allocated
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        // Enough for a page in flight per pipeline stage plus slack.
        Self::new(8)
    }
}

/// A byte buffer owned by its user and returned to the pool on drop.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Weak<Mutex<PoolInner>>,
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

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            let mut inner = pool.lock();
            if inner.free.len() < inner.max_retained {
                inner.free.push_back(mem::take(&mut self.data));
            }
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_and_return() {
        let pool = BufferPool::new(4);
        let buf = pool.rent(100);
        assert_eq!(buf.len(), 100);
        assert_eq!(pool.total_allocated(), 1);
        assert_eq!(pool.available(), 0);

        drop(buf);
        assert_eq!(pool.available(), 1);

        let _buf = pool.rent(50);
        assert_eq!(pool.total_allocated(), 1);
    }

    #[test]
    fn rented_buffers_are_zeroed() {
        let pool = BufferPool::new(4);
        let mut buf = pool.rent(8);
        buf.copy_from_slice(&[0xFF; 8]);
        drop(buf);
        let buf = pool.rent(8);
        assert_eq!(&*buf, &[0u8; 8]);
    }

    #[test]
    fn retention_is_bounded() {
        let pool = BufferPool::new(2);
        let bufs: Vec<_> = (0..3).map(|_| pool.rent(16)).collect();
        drop(bufs);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn shared_handles_observe_returns() {
        let pool = BufferPool::new(4);
        let other = pool.clone();
        let buf = pool.rent(16);
        assert_eq!(other.available(), 0);
        drop(buf);
        assert_eq!(other.available(), 1);
    }

    #[test]
    fn outliving_the_pool_is_fine() {
        let pool = BufferPool::new(4);
        let buf = pool.rent(16);
        drop(pool);
        drop(buf);
    }
}
