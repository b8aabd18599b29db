//! Memory pool contract for connection scoped buffers.
//!
//! Every accepted connection takes its header, chunk and copy buffers from a
//! [`MemoryPool`] and gives them back when the connection closes. Buffers are never
//! allocated per request. The pool is the only resource shared between connections,
//! so implementations must tolerate concurrent `allocate`/`free` calls.

use crate::protocol::AllocError;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

/// A fixed size byte buffer handed out by a [`MemoryPool`].
pub struct PooledBuffer {
    data: Box<[u8]>,
}

impl PooledBuffer {
    /// Allocates a zeroed buffer of exactly `size` bytes, reporting allocation failure
    /// instead of aborting the process.
    pub fn try_new(size: usize) -> Result<Self, AllocError> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|e| AllocError::from_reserve(size, e))?;
        data.resize(size, 0);
        Ok(Self { data: data.into_boxed_slice() })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer").field("capacity", &self.capacity()).finish()
    }
}

/// Allocation contract used by the connection to obtain its long lived buffers.
#[cfg_attr(test, mockall::automock)]
pub trait MemoryPool: Send + Sync {
    /// Returns a buffer of at least `min_size` bytes.
    fn allocate(&self, min_size: usize) -> Result<PooledBuffer, AllocError>;

    /// Gives a buffer back to the pool.
    fn free(&self, buffer: PooledBuffer);
}

/// A pool without any retention, every allocation comes from the heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapPool;

impl MemoryPool for HeapPool {
    fn allocate(&self, min_size: usize) -> Result<PooledBuffer, AllocError> {
        PooledBuffer::try_new(min_size)
    }

    fn free(&self, buffer: PooledBuffer) {
        drop(buffer);
    }
}

/// A pool that keeps freed buffers around and hands them out again.
///
/// The smallest retained buffer holding at least the requested size is reused, at most
/// `max_retained` buffers are kept.
#[derive(Debug)]
pub struct RecyclingPool {
    retained: Mutex<Vec<PooledBuffer>>,
    max_retained: usize,
}

impl RecyclingPool {
    pub fn new(max_retained: usize) -> Self {
        Self { retained: Mutex::new(Vec::with_capacity(max_retained)), max_retained }
    }

    /// Number of buffers currently parked in the pool
    pub fn retained(&self) -> usize {
        self.retained.lock().map_or(0, |retained| retained.len())
    }
}

impl MemoryPool for RecyclingPool {
    fn allocate(&self, min_size: usize) -> Result<PooledBuffer, AllocError> {
        if let Ok(mut retained) = self.retained.lock() {
            let best_fit = retained
                .iter()
                .enumerate()
                .filter(|(_, buffer)| buffer.capacity() >= min_size)
                .min_by_key(|(_, buffer)| buffer.capacity())
                .map(|(index, _)| index);
            if let Some(index) = best_fit {
                let mut buffer = retained.swap_remove(index);
                buffer.fill(0);
                return Ok(buffer);
            }
        }
        PooledBuffer::try_new(min_size)
    }

    fn free(&self, buffer: PooledBuffer) {
        if let Ok(mut retained) = self.retained.lock() {
            if retained.len() < self.max_retained {
                retained.push(buffer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_pool_allocates_requested_size() {
        let buffer = HeapPool.allocate(4096).unwrap();
        assert_eq!(buffer.capacity(), 4096);
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn impossible_allocation_is_reported() {
        let result = PooledBuffer::try_new(usize::MAX);
        let error = result.err().unwrap();
        assert_eq!(error.requested(), usize::MAX);
    }

    #[test]
    fn recycling_pool_reuses_freed_buffers() {
        let pool = RecyclingPool::new(2);
        let mut buffer = pool.allocate(128).unwrap();
        buffer[0] = 42;
        pool.free(buffer);
        assert_eq!(pool.retained(), 1);

        let buffer = pool.allocate(64).unwrap();
        assert_eq!(buffer.capacity(), 128);
        assert_eq!(buffer[0], 0);
        assert_eq!(pool.retained(), 0);
    }

    #[test]
    fn recycling_pool_bounds_retention() {
        let pool = RecyclingPool::new(1);
        pool.free(PooledBuffer::try_new(16).unwrap());
        pool.free(PooledBuffer::try_new(16).unwrap());
        assert_eq!(pool.retained(), 1);
    }

    #[test]
    fn recycling_pool_is_shared_between_threads() {
        let pool = std::sync::Arc::new(RecyclingPool::new(8));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = std::sync::Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let buffer = pool.allocate(256).unwrap();
                        pool.free(buffer);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.retained() <= 8);
    }
}
