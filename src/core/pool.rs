//! Reusable byte-buffer pool with power-of-two sizing and TTL reclamation.
//!
//! Workers borrow a scratch buffer per event and return it afterwards, so
//! steady-state processing allocates nothing. Buffers are bucketed by
//! power-of-two capacity between 4 KiB and the configured cap; requests above
//! the cap are clamped, which keeps a runaway payload from pinning a giant
//! allocation in the pool.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::PoolSettings;

const MIN_BUFFER_SIZE: usize = 4 * 1024;

/// Snapshot of pool occupancy and effectiveness.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Buffers currently pooled, across all buckets.
    pub pooled_buffers: usize,
    /// Total capacity of pooled buffers, in bytes.
    pub pooled_bytes: usize,
    /// Acquisitions served from the pool.
    pub hits: u64,
    /// Acquisitions that had to allocate.
    pub misses: u64,
    /// Buffers reclaimed by TTL cleanup.
    pub reclaimed: u64,
}

struct IdleBuffer {
    buf: Vec<u8>,
    idle_since: Instant,
}

struct PoolInner {
    buckets: HashMap<usize, Vec<IdleBuffer>>,
    hits: u64,
    misses: u64,
    reclaimed: u64,
}

/// Pool of reusable byte buffers, loaned out one operation at a time.
pub struct BufferPool {
    settings: PoolSettings,
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    /// Create a pool with the given settings.
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(PoolInner {
                buckets: HashMap::new(),
                hits: 0,
                misses: 0,
                reclaimed: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Bucket capacity for a requested length: next power of two, floored at
    /// 4 KiB and capped at the configured maximum.
    pub fn bucket_size(&self, len: usize) -> usize {
        let wanted = len.max(MIN_BUFFER_SIZE).next_power_of_two();
        wanted.min(self.settings.max_buffer_size)
    }

    /// Borrow a cleared buffer with capacity for `len` bytes (subject to the
    /// pool cap).
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        let size = self.bucket_size(len);
        let mut inner = self.lock();
        if let Some(bucket) = inner.buckets.get_mut(&size)
            && let Some(idle) = bucket.pop()
        {
            inner.hits += 1;
            return idle.buf;
        }
        inner.misses += 1;
        drop(inner);
        Vec::with_capacity(size)
    }

    /// Return a borrowed buffer. Buffers beyond the bucket depth are dropped.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let size = buf.capacity();
        if size < MIN_BUFFER_SIZE || size > self.settings.max_buffer_size {
            return;
        }
        let bucket_depth = self.settings.bucket_depth;
        let mut inner = self.lock();
        let bucket = inner.buckets.entry(size).or_default();
        if bucket.len() < bucket_depth {
            bucket.push(IdleBuffer {
                buf,
                idle_since: Instant::now(),
            });
        }
    }

    /// Drop buffers idle past the TTL. Returns how many were reclaimed.
    pub fn cleanup(&self) -> usize {
        let ttl = self.settings.buffer_ttl;
        let mut inner = self.lock();
        let mut reclaimed = 0;
        for bucket in inner.buckets.values_mut() {
            let before = bucket.len();
            bucket.retain(|idle| idle.idle_since.elapsed() <= ttl);
            reclaimed += before - bucket.len();
        }
        inner.reclaimed += reclaimed as u64;
        if reclaimed > 0 {
            log::debug!("buffer pool reclaimed {} idle buffers", reclaimed);
        }
        reclaimed
    }

    /// Snapshot of occupancy and counters.
    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        let pooled_buffers = inner.buckets.values().map(Vec::len).sum();
        let pooled_bytes = inner
            .buckets
            .iter()
            .map(|(size, bucket)| size * bucket.len())
            .sum();
        PoolStats {
            pooled_buffers,
            pooled_bytes,
            hits: inner.hits,
            misses: inner.misses,
            reclaimed: inner.reclaimed,
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}
