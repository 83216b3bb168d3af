//! Configuration for the framegate isolation runtime.
//!
//! All tunables are passed in by the embedder at construction time; nothing
//! is read from files or environment variables. Every settings struct has a
//! `Default` matching the reference policy values and a `validate()` that
//! rejects nonsensical combinations before any subsystem starts.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FramegateError;

/// Top-level configuration for an [`IsolationManager`](crate::core::IsolationManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Queue capacities and batching behavior.
    pub queues: QueueSettings,
    /// Wall-clock budget for host-thread batch processing.
    #[serde(with = "duration_millis")]
    pub frame_budget: Duration,
    /// How long `queue_event` waits for queue space before reporting failure.
    #[serde(with = "duration_millis")]
    pub enqueue_timeout: Duration,
    /// Async file engine limits and timeouts.
    pub file_engine: FileEngineSettings,
    /// Payload-size thresholds for heavy/light classification.
    pub heavy: HeavyThresholds,
    /// Retry policy for transient file operation failures.
    pub retry: RetrySettings,
    /// Dedicated I/O thread pool sizing.
    pub io_pool: IoPoolSettings,
    /// Buffer pool sizing and reclamation.
    pub pool: PoolSettings,
    /// Interval of the background cleanup task.
    #[serde(with = "duration_millis")]
    pub cleanup_interval: Duration,
    /// Interval of the metrics collection task.
    #[serde(with = "duration_millis")]
    pub metrics_interval: Duration,
}

/// Queue capacities per priority band and batch-take behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Capacity of the high-priority queue.
    pub high_capacity: usize,
    /// Capacity of the medium-priority queue.
    pub medium_capacity: usize,
    /// Capacity of the low-priority queue.
    pub low_capacity: usize,
    /// Maximum number of events a single batch take returns.
    pub max_batch_size: usize,
    /// Maximum time a batch take spends collecting after the first event.
    #[serde(with = "duration_millis")]
    pub batch_timeout: Duration,
}

/// Limits and per-operation timeouts of the async file engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEngineSettings {
    /// Global cap on concurrent file operations.
    pub max_concurrent: usize,
    /// Chunk size for reads, writes, and copies.
    pub chunk_size: usize,
    /// Files larger than this are deleted on the I/O thread pool.
    pub large_delete_bytes: u64,
    /// Upper bound of the per-path lock table before unheld entries are evicted.
    pub path_lock_capacity: usize,
    /// Timeout for a single read operation.
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,
    /// Timeout for a single write operation.
    #[serde(with = "duration_millis")]
    pub write_timeout: Duration,
    /// Timeout for a single copy operation.
    #[serde(with = "duration_millis")]
    pub copy_timeout: Duration,
    /// Timeout for a single delete operation.
    #[serde(with = "duration_millis")]
    pub delete_timeout: Duration,
    /// Timeout for a single enumerate operation.
    #[serde(with = "duration_millis")]
    pub enumerate_timeout: Duration,
}

/// Payload-size thresholds deciding whether an event is offloaded to the
/// dedicated I/O thread pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeavyThresholds {
    /// File-read events with payloads above this are heavy.
    pub file_read_payload: usize,
    /// File-read events whose metadata reports a file above this are heavy.
    pub file_read_size: u64,
    /// File-write events with payloads above this are heavy.
    pub file_write_payload: usize,
    /// Texture-share events with payloads above this are heavy.
    pub texture_share_payload: usize,
}

/// Retry policy applied to transient file operation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts for read, write, and delete.
    pub max_attempts: usize,
    /// Attempts for copy and enumerate.
    pub bulk_max_attempts: usize,
    /// Delay before the first retry.
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    /// Ceiling on the delay between retries.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
}

/// Sizing of the dedicated I/O thread pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoPoolSettings {
    /// Threads in the manager-level pool for arbitrary offloaded tasks.
    pub manager_threads: usize,
    /// Threads in each worker's pool for heavy event batches.
    pub worker_threads: usize,
    /// Timeout for one heavy sub-batch dispatched by a worker.
    #[serde(with = "duration_millis")]
    pub heavy_batch_timeout: Duration,
    /// Grace period per thread at shutdown before it is abandoned.
    #[serde(with = "duration_millis")]
    pub shutdown_grace: Duration,
}

/// Buffer pool sizing and reclamation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Largest buffer the pool hands out; requests above it are clamped.
    pub max_buffer_size: usize,
    /// How many idle buffers each size bucket retains.
    pub bucket_depth: usize,
    /// Idle buffers older than this are reclaimed by the cleanup task.
    #[serde(with = "duration_millis")]
    pub buffer_ttl: Duration,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            queues: QueueSettings::default(),
            frame_budget: Duration::from_millis(16),
            enqueue_timeout: Duration::from_millis(100),
            file_engine: FileEngineSettings::default(),
            heavy: HeavyThresholds::default(),
            retry: RetrySettings::default(),
            io_pool: IoPoolSettings::default(),
            pool: PoolSettings::default(),
            cleanup_interval: Duration::from_secs(30),
            metrics_interval: Duration::from_millis(16),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            high_capacity: 1000,
            medium_capacity: 2000,
            low_capacity: 5000,
            max_batch_size: 10,
            batch_timeout: Duration::from_millis(16),
        }
    }
}

impl Default for FileEngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 20,
            chunk_size: 8 * 1024,
            large_delete_bytes: 10 * 1024 * 1024,
            path_lock_capacity: 1024,
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(300),
            copy_timeout: Duration::from_secs(600),
            delete_timeout: Duration::from_secs(120),
            enumerate_timeout: Duration::from_secs(180),
        }
    }
}

impl Default for HeavyThresholds {
    fn default() -> Self {
        Self {
            file_read_payload: 1024 * 1024,
            file_read_size: 10 * 1024 * 1024,
            file_write_payload: 512 * 1024,
            texture_share_payload: 256 * 1024,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            bulk_max_attempts: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Default for IoPoolSettings {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            manager_threads: cpus * 2,
            worker_threads: std::cmp::max(2, cpus / 2),
            heavy_batch_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_buffer_size: 64 * 1024,
            bucket_depth: 32,
            buffer_ttl: Duration::from_secs(60),
        }
    }
}

impl IsolationConfig {
    /// Validate configuration values for correctness.
    pub fn validate(&self) -> Result<(), FramegateError> {
        if self.queues.high_capacity == 0
            || self.queues.medium_capacity == 0
            || self.queues.low_capacity == 0
        {
            return Err(FramegateError::config("queue capacities must be > 0"));
        }
        if self.queues.max_batch_size == 0 {
            return Err(FramegateError::config("max_batch_size must be > 0"));
        }
        if self.frame_budget.is_zero() {
            return Err(FramegateError::config("frame_budget must be > 0"));
        }
        if self.file_engine.max_concurrent == 0 {
            return Err(FramegateError::config("max_concurrent must be > 0"));
        }
        if self.file_engine.chunk_size == 0 {
            return Err(FramegateError::config("chunk_size must be > 0"));
        }
        if self.io_pool.manager_threads == 0 || self.io_pool.worker_threads == 0 {
            return Err(FramegateError::config("thread pool sizes must be > 0"));
        }
        if self.retry.max_attempts == 0 || self.retry.bulk_max_attempts == 0 {
            return Err(FramegateError::config("retry attempt counts must be > 0"));
        }
        if self.pool.max_buffer_size == 0 || !self.pool.max_buffer_size.is_power_of_two() {
            return Err(FramegateError::config(
                "max_buffer_size must be a power of two",
            ));
        }
        Ok(())
    }
}

/// Serde helper storing `Duration` fields as integer milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
