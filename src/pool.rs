//! Byte buffer pooling.
//!
//! Sessions rent their frame and reassembly buffers here instead of
//! allocating per connection. A rented buffer returns itself to the pool when
//! dropped, so every exit path of a session gives its buffers back.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Default number of idle small buffers kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 256;

/// Buffer size classes.
pub const SMALL_BUFFER_SIZE: usize = 4096;
pub const MEDIUM_BUFFER_SIZE: usize = 65536;
pub const LARGE_BUFFER_SIZE: usize = 1_048_576;

const SIZE_CLASSES: [usize; 3] = [SMALL_BUFFER_SIZE, MEDIUM_BUFFER_SIZE, LARGE_BUFFER_SIZE];

/// Pool of reusable byte buffers, split into size classes.
///
/// A buffer is kept only in the class its capacity fits. Buffers larger than
/// [`LARGE_BUFFER_SIZE`] are never pooled, so one oversized message cannot
/// pin its allocation for the life of the server.
#[derive(Debug)]
pub struct BufferPool {
    classes: [Mutex<VecDeque<Vec<u8>>>; 3],
    max_idle: usize,
    stats: PoolStats,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

impl BufferPool {
    /// Create a pool that keeps at most `max_idle` small buffers around.
    ///
    /// Medium buffers are capped at a quarter of that and large buffers at a
    /// sixteenth, with at least one of each when `max_idle` is non-zero.
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            classes: std::array::from_fn(|_| Mutex::new(VecDeque::new())),
            max_idle,
            stats: PoolStats::default(),
        }
    }

    fn class_for(len: usize) -> Option<usize> {
        SIZE_CLASSES.iter().position(|&size| len <= size)
    }

    fn class_limit(&self, class: usize) -> usize {
        (self.max_idle >> (class * 2)).max(self.max_idle.min(1))
    }

    /// Rent a zeroed buffer of exactly `len` bytes.
    ///
    /// Reuses an idle buffer of the matching size class when one is
    /// available, allocating otherwise.
    #[must_use]
    pub fn rent(self: &Arc<Self>, len: usize) -> PooledBuffer {
        let reused = Self::class_for(len).and_then(|class| {
            self.classes[class]
                .try_lock()
                .ok()
                .and_then(|mut idle| idle.pop_front())
        });

        let mut buf = match reused {
            Some(mut buf) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                buf.clear();
                buf
            },
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(len)
            },
        };
        buf.resize(len, 0);

        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    fn give_back(&self, buf: Vec<u8>) {
        if let Some(class) = Self::class_for(buf.capacity()) {
            let limit = self.class_limit(class);
            if let Ok(mut idle) = self.classes[class].lock() {
                if idle.len() < limit {
                    idle.push_back(buf);
                    self.stats.returns.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }
        self.stats.discards.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of idle buffers across all size classes.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.classes
            .iter()
            .map(|class| class.lock().map(|idle| idle.len()).unwrap_or(0))
            .sum()
    }

    /// Get pool statistics.
    #[must_use]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

/// Pool statistics.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Rentals served from an idle buffer.
    pub hits: AtomicUsize,
    /// Rentals that had to allocate.
    pub misses: AtomicUsize,
    /// Buffers returned to the pool.
    pub returns: AtomicUsize,
    /// Buffers dropped because their class was full or they were oversized.
    pub discards: AtomicUsize,
}

impl PoolStats {
    /// Fraction of rentals served without allocating.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// A rented buffer. Returns to its pool on drop.
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .finish()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_and_return() {
        let pool = Arc::new(BufferPool::new(4));
        {
            let buf = pool.rent(1024);
            assert_eq!(buf.len(), 1024);
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.stats().returns.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_reused_buffer_is_zeroed() {
        let pool = Arc::new(BufferPool::new(4));
        {
            let mut buf = pool.rent(16);
            buf.fill(0xAA);
        }
        let buf = pool.rent(32);
        assert_eq!(buf.len(), 32);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(pool.stats().hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_discard_when_full() {
        let pool = Arc::new(BufferPool::new(1));
        let a = pool.rent(8);
        let b = pool.rent(8);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.stats().discards.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_hit_rate() {
        let pool = Arc::new(BufferPool::new(4));
        assert_eq!(pool.stats().hit_rate(), 0.0);
        drop(pool.rent(8));
        drop(pool.rent(8));
        assert!((pool.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_oversized_buffer_is_discarded() {
        let pool = Arc::new(BufferPool::new(4));
        drop(pool.rent(LARGE_BUFFER_SIZE + 1));
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.stats().discards.load(Ordering::Relaxed), 1);

        drop(pool.rent(LARGE_BUFFER_SIZE));
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_size_classes_are_separate() {
        let pool = Arc::new(BufferPool::new(4));
        drop(pool.rent(MEDIUM_BUFFER_SIZE));
        let small = pool.rent(64);
        assert_eq!(pool.stats().hits.load(Ordering::Relaxed), 0);
        assert_eq!(pool.idle(), 1);
        drop(small);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_large_class_limit() {
        let pool = Arc::new(BufferPool::new(4));
        let a = pool.rent(LARGE_BUFFER_SIZE);
        let b = pool.rent(LARGE_BUFFER_SIZE);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.stats().discards.load(Ordering::Relaxed), 1);
    }
}
