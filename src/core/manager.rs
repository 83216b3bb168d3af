//! Isolation manager: the top-level owner of queues, workers, pools, and the
//! async file engine.
//!
//! The manager is the only component the host talks to. It enriches and
//! routes events, enforces the per-frame budget on batch submissions, runs
//! the metrics and cleanup timers, and owns every other component's
//! lifetime. Workers hold non-owning views of their queue and never a
//! reference back to the manager; everything flows out through the alert
//! channel.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::IsolationConfig;
use crate::core::alert::{Alert, AlertKind, AlertSink};
use crate::core::event::{Event, EventType};
use crate::core::io_pool::{IoPoolStats, IoThreadPool};
use crate::core::pool::{BufferPool, PoolStats};
use crate::core::processor::{FileEventProcessor, ProcessorRegistry};
use crate::core::queue::{EventQueue, QueueStats};
use crate::core::worker::{EventWorker, WorkerStats};
use crate::error::FramegateResult;
use crate::fileio::progress::{OperationProgress, ProgressTracker};
use crate::fileio::AsyncFileEngine;

/// Depth of the high-priority queue above which a backlog alert fires.
const HIGH_BACKLOG_THRESHOLD: usize = 100;
/// Average worker latency above which a processing-delay alert fires.
const PROCESSING_DELAY_THRESHOLD_MS: f64 = 10.0;

/// Result of submitting an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Accepted into a queue; a worker will process it.
    Queued {
        /// Event identifier.
        id: String,
    },
    /// Processed inline within the frame budget.
    Processed {
        /// Event identifier.
        id: String,
    },
    /// Shed past the frame budget and re-enqueued for background processing.
    QueuedForNextFrame {
        /// Event identifier.
        id: String,
    },
    /// Not accepted.
    Failed {
        /// Event identifier.
        id: String,
        /// Why the event was rejected.
        reason: String,
    },
}

impl QueueOutcome {
    /// Event identifier regardless of variant.
    pub fn id(&self) -> &str {
        match self {
            QueueOutcome::Queued { id }
            | QueueOutcome::Processed { id }
            | QueueOutcome::QueuedForNextFrame { id }
            | QueueOutcome::Failed { id, .. } => id,
        }
    }

    /// Whether the event was accepted in some form.
    pub fn is_success(&self) -> bool {
        !matches!(self, QueueOutcome::Failed { .. })
    }
}

/// An external resource (file handle, socket, shared-texture slot) tracked
/// by the manager and reclaimed after expiry.
pub trait ResourceHandle: Send {
    /// Stable identifier.
    fn id(&self) -> &str;
    /// When the handle may be reclaimed.
    fn expires_at(&self) -> Instant;
    /// Release the underlying resource.
    fn dispose(&mut self);
}

/// A file operation submitted through [`IsolationManager::queue_async_file_op`].
#[derive(Debug, Clone)]
pub enum FileOperation {
    /// Read the file at `path`.
    Read {
        /// File to read.
        path: PathBuf,
    },
    /// Atomically write `bytes` to `path`.
    Write {
        /// Target file.
        path: PathBuf,
        /// Payload.
        bytes: Vec<u8>,
        /// Keep a backup until the write commits.
        create_backup: bool,
    },
    /// Copy `src` to `dst`.
    Copy {
        /// Source file.
        src: PathBuf,
        /// Destination file.
        dst: PathBuf,
        /// Replace an existing destination.
        overwrite: bool,
    },
    /// Delete the file at `path`.
    Delete {
        /// File to delete.
        path: PathBuf,
        /// Fail if the file does not exist.
        verify_exists: bool,
    },
    /// List files matching `pattern` under `path`.
    Enumerate {
        /// Directory to walk.
        path: PathBuf,
        /// Glob pattern.
        pattern: String,
        /// Recurse into subdirectories.
        recursive: bool,
    },
}

struct EventRegistration {
    token: CancellationToken,
    registered_at: Instant,
    ttl: Duration,
}

/// Full statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IsolationStats {
    /// Per-queue stats (high, medium, low).
    pub queues: Vec<QueueStats>,
    /// Per-worker stats.
    pub workers: Vec<WorkerStats>,
    /// Buffer pool stats.
    pub pool: PoolStats,
    /// Manager-level I/O pool stats.
    pub io_pool: IoPoolStats,
    /// Registered resource handles.
    pub active_resources: usize,
    /// File operations in flight.
    pub active_file_operations: usize,
    /// Rollback points awaiting completion.
    pub pending_rollback_points: usize,
    /// Events processed (inline and by workers).
    pub total_processed: u64,
    /// Events submitted through batch calls.
    pub total_batched: u64,
    /// Cumulative host-thread time saved by frame shedding, in milliseconds.
    pub frame_savings_ms: f64,
    /// Manager uptime in milliseconds.
    pub uptime_ms: u64,
}

/// Top-level owner of the I/O isolation runtime.
pub struct IsolationManager {
    config: IsolationConfig,
    alerts: AlertSink,
    high: Arc<EventQueue>,
    medium: Arc<EventQueue>,
    low: Arc<EventQueue>,
    workers: Vec<Arc<EventWorker>>,
    worker_io_pools: Vec<Arc<IoThreadPool>>,
    registry: Arc<ProcessorRegistry>,
    pool: Arc<BufferPool>,
    io_pool: Arc<IoThreadPool>,
    engine: Arc<AsyncFileEngine>,
    tracker: Arc<ProgressTracker>,
    active_resources: Arc<Mutex<HashMap<String, Box<dyn ResourceHandle>>>>,
    event_tokens: Arc<Mutex<HashMap<String, EventRegistration>>>,
    total_processed: Arc<AtomicU64>,
    total_batched: AtomicU64,
    frame_savings_micros: AtomicU64,
    started_at: Instant,
    shutdown_token: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl IsolationManager {
    /// Create a manager with pass-through processors for the collaborator
    /// domains and the file engine bound to file-typed events.
    pub fn new(config: IsolationConfig) -> FramegateResult<Self> {
        Self::with_registry(config, ProcessorRegistry::with_defaults())
    }

    /// Create a manager with caller-supplied processors. File-typed events
    /// are always routed to the async file engine.
    pub fn with_registry(
        config: IsolationConfig,
        mut registry: ProcessorRegistry,
    ) -> FramegateResult<Self> {
        config.validate()?;
        let alerts = AlertSink::new(1024);

        let queue = |name: &str, capacity: usize| {
            Arc::new(EventQueue::new(
                name,
                capacity,
                config.queues.max_batch_size,
                config.queues.batch_timeout,
                alerts.clone(),
            ))
        };
        let high = queue("high", config.queues.high_capacity);
        let medium = queue("medium", config.queues.medium_capacity);
        let low = queue("low", config.queues.low_capacity);

        let pool = Arc::new(BufferPool::new(config.pool.clone()));
        let io_pool = Arc::new(IoThreadPool::new(
            "framegate-io",
            config.io_pool.manager_threads,
            config.io_pool.shutdown_grace,
            alerts.clone(),
        )?);
        let tracker = Arc::new(ProgressTracker::new());
        let engine = Arc::new(AsyncFileEngine::new(
            config.file_engine.clone(),
            config.retry.clone(),
            Arc::clone(&io_pool),
            Arc::clone(&tracker),
            alerts.clone(),
        )?);

        registry.register(
            EventType::FileRead,
            Arc::new(FileEventProcessor::new(Arc::clone(&engine))),
        );
        registry.register(
            EventType::FileWrite,
            Arc::new(FileEventProcessor::new(Arc::clone(&engine))),
        );
        let registry = Arc::new(registry);

        let mut workers = Vec::with_capacity(EventType::ALL.len());
        let mut worker_io_pools = Vec::with_capacity(EventType::ALL.len());
        for event_type in EventType::ALL {
            let worker_pool = Arc::new(IoThreadPool::new(
                format!("framegate-io-{}", event_type),
                config.io_pool.worker_threads,
                config.io_pool.shutdown_grace,
                alerts.clone(),
            )?);
            let target = match event_type {
                EventType::AudioIn
                | EventType::AudioOut
                | EventType::MidiIn
                | EventType::MidiOut
                | EventType::UserInput => &high,
                EventType::FileRead
                | EventType::FileWrite
                | EventType::Network
                | EventType::TextureShare => &medium,
                EventType::CacheUpdate | EventType::MetadataUpdate => &low,
            };
            workers.push(Arc::new(EventWorker::new(
                event_type,
                Arc::clone(target),
                Arc::clone(&registry),
                Arc::clone(&pool),
                Arc::clone(&worker_pool),
                config.heavy.clone(),
                config.io_pool.heavy_batch_timeout,
                alerts.clone(),
            )));
            worker_io_pools.push(worker_pool);
        }

        Ok(Self {
            config,
            alerts,
            high,
            medium,
            low,
            workers,
            worker_io_pools,
            registry,
            pool,
            io_pool,
            engine,
            tracker,
            active_resources: Arc::new(Mutex::new(HashMap::new())),
            event_tokens: Arc::new(Mutex::new(HashMap::new())),
            total_processed: Arc::new(AtomicU64::new(0)),
            total_batched: AtomicU64::new(0),
            frame_savings_micros: AtomicU64::new(0),
            started_at: Instant::now(),
            shutdown_token: CancellationToken::new(),
            background: Mutex::new(Vec::new()),
        })
    }

    /// Start queues, workers, and the metrics and cleanup timers.
    pub fn start(&self) {
        self.high.start_processing();
        self.medium.start_processing();
        self.low.start_processing();
        for worker in &self.workers {
            worker.start();
        }
        let mut background = self
            .background
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        background.push(self.spawn_metrics_task());
        background.push(self.spawn_cleanup_task());
        log::info!(
            "isolation manager started ({} workers, frame budget {:?})",
            self.workers.len(),
            self.config.frame_budget
        );
    }

    /// Queue a single event for background processing.
    ///
    /// The event is enriched, its cancellation token registered, and it is
    /// enqueued with the configured timeout (100 ms default). A timed-out
    /// enqueue drops the event and reports `Failed("queue timeout")`.
    pub async fn queue_event(&self, mut event: Event) -> QueueOutcome {
        self.enrich(&mut event, "host");
        let id = event.id.clone();
        self.register_event_token(&event);

        let queue = self.queue_for(event.event_type);
        match queue.try_add(event, self.config.enqueue_timeout).await {
            Ok(true) => QueueOutcome::Queued { id },
            Ok(false) => {
                self.remove_event_token(&id);
                QueueOutcome::Failed {
                    id,
                    reason: "queue timeout".to_string(),
                }
            }
            Err(e) => {
                self.remove_event_token(&id);
                QueueOutcome::Failed {
                    id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Process a batch of events on the caller's thread within the frame
    /// budget; once the budget is exhausted the remainder is shed to the
    /// queues with zero wait and reported as `QueuedForNextFrame`.
    pub async fn process_batch(&self, events: Vec<Event>) -> Vec<QueueOutcome> {
        let started = Instant::now();
        self.total_batched
            .fetch_add(events.len() as u64, Ordering::Relaxed);

        let mut outcomes = Vec::with_capacity(events.len());
        let mut inline_done = 0u64;
        let mut shed = 0u64;

        for mut event in events {
            if started.elapsed() > self.config.frame_budget {
                self.enrich(&mut event, "host-batch");
                let id = event.id.clone();
                self.register_event_token(&event);
                let queue = self.queue_for(event.event_type);
                match queue.try_add(event, Duration::ZERO).await {
                    Ok(true) => {
                        shed += 1;
                        outcomes.push(QueueOutcome::QueuedForNextFrame { id });
                    }
                    _ => {
                        self.remove_event_token(&id);
                        outcomes.push(QueueOutcome::Failed {
                            id,
                            reason: "queue full during frame shed".to_string(),
                        });
                    }
                }
                continue;
            }

            self.enrich(&mut event, "host-batch");
            let id = event.id.clone();
            let processor = self.registry.get(event.event_type);
            event.metadata.processing_started_at = Some(Instant::now());
            let mut scratch = self.pool.acquire(event.payload_len());
            let result = processor.process(&mut event, &mut scratch).await;
            self.pool.release(scratch);
            match result {
                Ok(()) => {
                    inline_done += 1;
                    self.total_processed.fetch_add(1, Ordering::Relaxed);
                    outcomes.push(QueueOutcome::Processed { id });
                }
                Err(e) => {
                    self.alerts.emit(
                        Alert::new(
                            AlertKind::EventProcessingFailed,
                            format!("inline event {} failed: {}", id, e),
                        )
                        .with_context("event_id", id.clone()),
                    );
                    outcomes.push(QueueOutcome::Failed {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if shed > 0 {
            // Credit the host with the time the shed events would have cost,
            // estimated from this call's inline average.
            let avg_micros = if inline_done > 0 {
                started.elapsed().as_micros() as u64 / inline_done.max(1)
            } else {
                1000
            };
            self.frame_savings_micros
                .fetch_add(shed * avg_micros, Ordering::Relaxed);
        }
        outcomes
    }

    /// Run a closure on the manager-level I/O thread pool.
    pub async fn execute_on_io_pool<F, T>(&self, f: F) -> FramegateResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.io_pool.execute(f).await
    }

    /// Dispatch a file operation to the async engine without waiting for it.
    /// Returns the operation id for progress queries and cancellation;
    /// completion and failure surface on the alert channel.
    pub fn queue_async_file_op(&self, op: FileOperation) -> String {
        let operation_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        self.tracker.register(&operation_id, cancel.clone());

        let engine = Arc::clone(&self.engine);
        let total_processed = Arc::clone(&self.total_processed);
        let id = operation_id.clone();
        tokio::spawn(async move {
            let result = match op {
                FileOperation::Read { path } => {
                    engine.read(&path, &cancel, &id).await.map(|_| ())
                }
                FileOperation::Write {
                    path,
                    bytes,
                    create_backup,
                } => engine
                    .write(&path, &bytes, create_backup, &cancel, &id)
                    .await
                    .map(|_| ()),
                FileOperation::Copy {
                    src,
                    dst,
                    overwrite,
                } => engine
                    .copy(&src, &dst, overwrite, &cancel, &id)
                    .await
                    .map(|_| ()),
                FileOperation::Delete {
                    path,
                    verify_exists,
                } => engine
                    .delete(&path, verify_exists, &cancel, &id)
                    .await
                    .map(|_| ()),
                FileOperation::Enumerate {
                    path,
                    pattern,
                    recursive,
                } => engine
                    .enumerate(&path, &pattern, recursive, &cancel, &id)
                    .await
                    .map(|_| ()),
            };
            match result {
                Ok(()) => {
                    total_processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => log::debug!("queued file op {} ended: {}", id, e),
            }
        });
        operation_id
    }

    /// Progress of an in-flight file operation.
    pub fn get_progress(&self, operation_id: &str) -> Option<OperationProgress> {
        self.tracker.get(operation_id)
    }

    /// Cancel a file operation or a queued event. Idempotent; returns
    /// whether anything was still in flight under that id.
    pub fn cancel_operation(&self, operation_id: &str) -> bool {
        if self.tracker.cancel(operation_id) {
            return true;
        }
        let tokens = self
            .event_tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match tokens.get(operation_id) {
            Some(registration) => {
                registration.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Track an external resource handle for expiry-based reclamation.
    pub fn register_resource(&self, handle: Box<dyn ResourceHandle>) {
        let mut resources = self
            .active_resources
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        resources.insert(handle.id().to_string(), handle);
    }

    /// Dispose and forget a tracked resource. Returns whether it existed.
    pub fn unregister_resource(&self, id: &str) -> bool {
        let handle = {
            let mut resources = self
                .active_resources
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            resources.remove(id)
        };
        match handle {
            Some(mut handle) => {
                handle.dispose();
                true
            }
            None => false,
        }
    }

    /// Subscribe to the alert stream.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.alerts.subscribe()
    }

    /// The async file engine, for direct awaited operations.
    pub fn file_engine(&self) -> Arc<AsyncFileEngine> {
        Arc::clone(&self.engine)
    }

    /// Full statistics snapshot.
    pub fn stats(&self) -> IsolationStats {
        IsolationStats {
            queues: vec![self.high.stats(), self.medium.stats(), self.low.stats()],
            workers: self.workers.iter().map(|w| w.stats()).collect(),
            pool: self.pool.stats(),
            io_pool: self.io_pool.stats(),
            active_resources: self
                .active_resources
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .len(),
            active_file_operations: self.tracker.active_count(),
            pending_rollback_points: self.engine.recovery().pending_count(),
            total_processed: self.total_processed.load(Ordering::Relaxed)
                + self
                    .workers
                    .iter()
                    .map(|w| w.stats().processed)
                    .sum::<u64>(),
            total_batched: self.total_batched.load(Ordering::Relaxed),
            frame_savings_ms: self.frame_savings_micros.load(Ordering::Relaxed) as f64 / 1000.0,
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }

    /// Stop workers, timers, pools, and the engine. Queued events are
    /// dropped; nothing survives a restart by design.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        self.high.stop_processing();
        self.medium.stop_processing();
        self.low.stop_processing();

        for worker in &self.workers {
            worker.stop(Duration::from_secs(2)).await;
        }
        {
            let mut background = self
                .background
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for task in background.drain(..) {
                task.abort();
            }
        }

        // Dispose whatever resources are still registered.
        let leftover: Vec<Box<dyn ResourceHandle>> = {
            let mut resources = self
                .active_resources
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            resources.drain().map(|(_, handle)| handle).collect()
        };
        for mut handle in leftover {
            handle.dispose();
        }

        self.engine.shutdown().await;
        for pool in &self.worker_io_pools {
            pool.shutdown().await;
        }
        self.io_pool.shutdown().await;
        log::info!("isolation manager shut down");
    }

    fn queue_for(&self, event_type: EventType) -> &Arc<EventQueue> {
        match event_type {
            EventType::AudioIn
            | EventType::AudioOut
            | EventType::MidiIn
            | EventType::MidiOut
            | EventType::UserInput => &self.high,
            EventType::FileRead
            | EventType::FileWrite
            | EventType::Network
            | EventType::TextureShare => &self.medium,
            EventType::CacheUpdate | EventType::MetadataUpdate => &self.low,
        }
    }

    fn enrich(&self, event: &mut Event, source: &str) {
        event.metadata.queued_at = Some(Instant::now());
        if event.metadata.source.is_none() {
            event.metadata.source = Some(source.to_string());
        }
        if event.metadata.data_size.is_none() {
            event.metadata.data_size = Some(event.payload_len() as u64);
        }
    }

    fn register_event_token(&self, event: &Event) {
        let mut tokens = self
            .event_tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tokens.insert(
            event.id.clone(),
            EventRegistration {
                token: event.cancel.clone(),
                registered_at: Instant::now(),
                ttl: event.timeout,
            },
        );
    }

    fn remove_event_token(&self, id: &str) {
        self.event_tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id);
    }

    fn spawn_metrics_task(&self) -> JoinHandle<()> {
        let high = Arc::clone(&self.high);
        let workers: Vec<Arc<EventWorker>> = self.workers.iter().map(Arc::clone).collect();
        let alerts = self.alerts.clone();
        let shutdown = self.shutdown_token.clone();
        let interval = self.config.metrics_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.cancelled() => break,
                }
                let collected = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    collect_metrics(&high, &workers, &alerts);
                }));
                if collected.is_err() {
                    alerts.emit(Alert::new(
                        AlertKind::MetricsCollectionFailed,
                        "metrics collection panicked",
                    ));
                }
            }
        })
    }

    fn spawn_cleanup_task(&self) -> JoinHandle<()> {
        let resources = Arc::clone(&self.active_resources);
        let event_tokens = Arc::clone(&self.event_tokens);
        let pool = Arc::clone(&self.pool);
        let recovery = self.engine.recovery();
        let alerts = self.alerts.clone();
        let shutdown = self.shutdown_token.clone();
        let interval = self.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.cancelled() => break,
                }

                let now = Instant::now();
                let expired: Vec<Box<dyn ResourceHandle>> = {
                    let mut resources = resources
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    let ids: Vec<String> = resources
                        .iter()
                        .filter(|(_, handle)| handle.expires_at() <= now)
                        .map(|(id, _)| id.clone())
                        .collect();
                    ids.into_iter()
                        .filter_map(|id| resources.remove(&id))
                        .collect()
                };
                for mut handle in expired {
                    let disposed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        handle.dispose();
                    }));
                    if disposed.is_err() {
                        alerts.emit(Alert::new(
                            AlertKind::BackgroundCleanupFailed,
                            "resource dispose panicked during cleanup",
                        ));
                    }
                }

                pool.cleanup();
                recovery.purge_completed().await;
                event_tokens
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .retain(|_, registration| {
                        registration.registered_at.elapsed() <= registration.ttl
                    });
            }
        })
    }
}

fn collect_metrics(high: &EventQueue, workers: &[Arc<EventWorker>], alerts: &AlertSink) {
    let depth = high.stats().depth;
    if depth > HIGH_BACKLOG_THRESHOLD {
        alerts.emit(
            Alert::new(
                AlertKind::HighPriorityQueueBacklog,
                format!("high-priority queue backlog: {} events", depth),
            )
            .with_measurement(depth as f64, HIGH_BACKLOG_THRESHOLD as f64),
        );
    }

    let worker_stats: Vec<WorkerStats> = workers.iter().map(|w| w.stats()).collect();
    let busy: Vec<&WorkerStats> = worker_stats.iter().filter(|s| s.processed > 0).collect();
    if !busy.is_empty() {
        let avg = busy.iter().map(|s| s.avg_processing_ms).sum::<f64>() / busy.len() as f64;
        if avg > PROCESSING_DELAY_THRESHOLD_MS {
            alerts.emit(
                Alert::new(
                    AlertKind::ProcessingDelay,
                    format!("average worker latency {:.1} ms", avg),
                )
                .with_measurement(avg, PROCESSING_DELAY_THRESHOLD_MS),
            );
        }
    }

    for (worker, stats) in workers.iter().zip(&worker_stats) {
        if !worker.is_running() {
            alerts.emit(
                Alert::new(
                    AlertKind::WorkerFailure,
                    format!("worker {} inactive while expected active", stats.event_type),
                )
                .with_context("event_type", stats.event_type.clone()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::EventPriority;

    fn quick_config() -> IsolationConfig {
        let mut config = IsolationConfig::default();
        // Small pools keep unit tests light.
        config.io_pool.manager_threads = 2;
        config.io_pool.worker_threads = 2;
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_event_enriches_and_routes() {
        let manager = IsolationManager::new(quick_config()).unwrap();
        let outcome = manager
            .queue_event(Event::new(EventType::CacheUpdate, EventPriority::Low))
            .await;
        assert!(matches!(outcome, QueueOutcome::Queued { .. }));
        let stats = manager.stats();
        assert_eq!(stats.queues[2].depth, 1, "cache-update routes to low");
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_routing_table() {
        let manager = IsolationManager::new(quick_config()).unwrap();
        for (event_type, queue_index) in [
            (EventType::AudioIn, 0),
            (EventType::MidiOut, 0),
            (EventType::UserInput, 0),
            (EventType::FileWrite, 1),
            (EventType::Network, 1),
            (EventType::TextureShare, 1),
            (EventType::CacheUpdate, 2),
            (EventType::MetadataUpdate, 2),
        ] {
            let before = manager.stats().queues[queue_index].depth;
            manager
                .queue_event(Event::new(event_type, EventPriority::Medium))
                .await;
            assert_eq!(
                manager.stats().queues[queue_index].depth,
                before + 1,
                "{} routes to queue {}",
                event_type,
                queue_index
            );
        }
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_operation_reaches_queued_event() {
        let manager = IsolationManager::new(quick_config()).unwrap();
        let outcome = manager
            .queue_event(Event::new(EventType::Network, EventPriority::Medium))
            .await;
        let id = outcome.id().to_string();
        assert!(manager.cancel_operation(&id));
        // Unknown ids are a no-op.
        assert!(!manager.cancel_operation("no-such-op"));
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resource_registration_and_disposal() {
        struct TestResource {
            id: String,
            disposed: Arc<std::sync::atomic::AtomicBool>,
        }
        impl ResourceHandle for TestResource {
            fn id(&self) -> &str {
                &self.id
            }
            fn expires_at(&self) -> Instant {
                Instant::now() + Duration::from_secs(3600)
            }
            fn dispose(&mut self) {
                self.disposed.store(true, Ordering::SeqCst);
            }
        }

        let manager = IsolationManager::new(quick_config()).unwrap();
        let disposed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        manager.register_resource(Box::new(TestResource {
            id: "res-1".to_string(),
            disposed: Arc::clone(&disposed),
        }));
        assert_eq!(manager.stats().active_resources, 1);
        assert!(manager.unregister_resource("res-1"));
        assert!(disposed.load(Ordering::SeqCst));
        assert!(!manager.unregister_resource("res-1"));
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_execute_on_io_pool() {
        let manager = IsolationManager::new(quick_config()).unwrap();
        let result = manager.execute_on_io_pool(|| 6 * 7).await.unwrap();
        assert_eq!(result, 42);
        manager.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stats_snapshot_shape() {
        let manager = IsolationManager::new(quick_config()).unwrap();
        let stats = manager.stats();
        assert_eq!(stats.queues.len(), 3);
        assert_eq!(stats.workers.len(), EventType::ALL.len());
        assert_eq!(stats.active_resources, 0);
        // Snapshot serializes for external monitors.
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("total_processed"));
        manager.shutdown().await;
    }
}
