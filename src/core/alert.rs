//! Alert types emitted by every runtime component.
//!
//! Alerts are delivered on a `tokio::sync::broadcast` channel owned by the
//! isolation manager. External consumers (performance monitors, log
//! correlators) subscribe and decide what to do; the runtime itself never
//! blocks on alert delivery.
use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Closed vocabulary of alert conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    /// An enqueue timed out because the queue was at capacity.
    QueueFull,
    /// Internal failure while adding an event to a queue.
    AddFailed,
    /// Internal failure during a single take.
    TakeFailed,
    /// Internal failure during a batch take.
    BatchTakeFailed,
    /// Internal failure during a priority take.
    PriorityTakeFailed,
    /// A worker loop started.
    WorkerStarted,
    /// A worker loop body raised an unexpected error.
    WorkerError,
    /// A whole batch failed to process.
    BatchProcessingFailed,
    /// A single event failed to process.
    EventProcessingFailed,
    /// A worker did not stop within its grace period.
    WorkerStopTimeout,
    /// A worker failed to release its resources on dispose.
    WorkerDisposeError,
    /// High-priority queue depth crossed its threshold.
    HighPriorityQueueBacklog,
    /// Average worker latency crossed its threshold.
    ProcessingDelay,
    /// A worker is inactive while expected active.
    WorkerFailure,
    /// The metrics task failed to collect a snapshot.
    MetricsCollectionFailed,
    /// The background cleanup task failed.
    BackgroundCleanupFailed,
    /// A resource handle could not be allocated or reclaimed.
    ResourceExhaustion,
    /// The buffer pool is under memory pressure.
    MemoryPressure,
    /// The I/O thread pool rejected a task because its queue was full.
    ThreadPoolExhaustion,
    /// The I/O thread pool came up.
    IoThreadPoolInitialized,
    /// The I/O thread pool failed to come up.
    IoThreadPoolInitFailed,
    /// A task panicked on an I/O pool thread.
    IoThreadWorkerError,
    /// An async file operation failed permanently.
    AsyncFileOperationFailed,
    /// An async file operation completed.
    AsyncFileOperationCompleted,
    /// An async file operation raised a retryable error.
    AsyncFileOperationError,
    /// Chunk-level progress of an async file operation.
    FileOperationProgress,
    /// A heavy sub-batch did not complete within its dispatch timeout.
    HeavyIoProcessingTimeout,
    /// A recoverable error on a background I/O thread.
    BackgroundIoThreadError,
    /// A fatal error on a background I/O thread.
    BackgroundIoThreadFatalError,
}

/// A single alert with its human-readable message and optional measurements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// What happened.
    pub kind: AlertKind,
    /// Human-readable description.
    pub message: String,
    /// When the alert was raised.
    pub timestamp: SystemTime,
    /// Observed value, when the alert is threshold-based.
    pub value: Option<f64>,
    /// The threshold that was crossed, when applicable.
    pub threshold: Option<f64>,
    /// Free-form context entries (queue name, event id, path, ...).
    pub context: HashMap<String, String>,
}

impl Alert {
    /// Create an alert with just a kind and message.
    pub fn new<S: Into<String>>(kind: AlertKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: SystemTime::now(),
            value: None,
            threshold: None,
            context: HashMap::new(),
        }
    }

    /// Attach an observed value and the threshold it crossed.
    pub fn with_measurement(mut self, value: f64, threshold: f64) -> Self {
        self.value = Some(value);
        self.threshold = Some(threshold);
        self
    }

    /// Attach a context entry.
    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Shared alert sender handed to every component.
///
/// Wraps a broadcast sender; sending never fails even with no subscribers.
#[derive(Debug, Clone)]
pub struct AlertSink {
    tx: broadcast::Sender<Alert>,
}

impl AlertSink {
    /// Create a sink with the given subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an alert. Lagging or absent subscribers are not an error.
    pub fn emit(&self, alert: Alert) {
        log::debug!("alert [{:?}]: {}", alert.kind, alert.message);
        let _ = self.tx.send(alert);
    }

    /// Subscribe to the alert stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }
}

impl Default for AlertSink {
    fn default() -> Self {
        Self::new(256)
    }
}
