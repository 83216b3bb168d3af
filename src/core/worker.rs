//! Background worker: the per-event-type consumer of a queue.
//!
//! A worker batch-takes events, splits each batch into heavy and light
//! sub-batches, processes the light half inline on the async runtime, and
//! offloads the heavy half to its dedicated I/O thread pool. Inside a batch,
//! events are grouped by priority; order-sensitive device streams run
//! sequentially, everything else in parallel (user input capped at 2).
//!
//! Failures are counted and alerted, never fatal: a failed event does not
//! abort its batch, a failed batch does not stop the worker.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::HeavyThresholds;
use crate::core::alert::{Alert, AlertKind, AlertSink};
use crate::core::event::{Event, EventStatus, EventType};
use crate::core::io_pool::IoThreadPool;
use crate::core::pool::BufferPool;
use crate::core::processor::ProcessorRegistry;
use crate::core::queue::EventQueue;

/// Snapshot of a worker's counters.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    /// Event type the worker is bound to.
    pub event_type: String,
    /// Events processed successfully.
    pub processed: u64,
    /// Events that failed or were cancelled before processing.
    pub failed: u64,
    /// Batches taken.
    pub batches: u64,
    /// Average per-event processing time in milliseconds.
    pub avg_processing_ms: f64,
    /// Whether the worker loop is alive.
    pub running: bool,
}

#[derive(Default)]
struct WorkerCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    batches: AtomicU64,
    busy_micros: AtomicU64,
}

/// Shared worker internals, cloneable into heavy-batch dispatch closures.
#[derive(Clone)]
struct WorkerCore {
    event_type: EventType,
    registry: Arc<ProcessorRegistry>,
    pool: Arc<BufferPool>,
    alerts: AlertSink,
    counters: Arc<WorkerCounters>,
}

impl WorkerCore {
    /// Process one batch portion grouped by priority. Returns the number of
    /// failures.
    async fn process_grouped(&self, events: Vec<Event>) -> usize {
        let mut groups: BTreeMap<usize, Vec<Event>> = BTreeMap::new();
        for event in events {
            groups.entry(event.priority.index()).or_default().push(event);
        }

        let mut failures = 0usize;
        for (_, group) in groups {
            let (parallel, sequential): (Vec<Event>, Vec<Event>) = group
                .into_iter()
                .partition(|e| e.event_type.is_parallelizable());

            if !parallel.is_empty() {
                let user_input_slots = Arc::new(Semaphore::new(2));
                let futures = parallel.into_iter().map(|event| {
                    let core = self.clone();
                    let slots = Arc::clone(&user_input_slots);
                    async move {
                        let _permit = if event.event_type == EventType::UserInput {
                            slots.acquire_owned().await.ok()
                        } else {
                            None
                        };
                        core.process_event(event).await
                    }
                });
                failures += join_all(futures)
                    .await
                    .into_iter()
                    .filter(|ok| !ok)
                    .count();
            }
            for event in sequential {
                if !self.process_event(event).await {
                    failures += 1;
                }
            }
        }
        failures
    }

    /// Process a single event. Returns whether it succeeded.
    async fn process_event(&self, mut event: Event) -> bool {
        event.metadata.processing_started_at = Some(Instant::now());
        event.metadata.status = Some(EventStatus::Processing);

        if event.is_cancelled() {
            event.metadata.status = Some(EventStatus::Failed);
            event.metadata.error = Some("cancelled before processing".to_string());
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let started = Instant::now();
        let processor = self.registry.get(event.event_type);
        let mut scratch = self.pool.acquire(event.payload_len());

        let outcome = std::panic::AssertUnwindSafe(processor.process(&mut event, &mut scratch))
            .catch_unwind()
            .await;
        self.pool.release(scratch);
        self.counters
            .busy_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);

        match outcome {
            Ok(Ok(())) => {
                event.metadata.status = Some(EventStatus::Success);
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(Err(e)) => {
                event.metadata.status = Some(EventStatus::Failed);
                event.metadata.error = Some(e.to_string());
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.alerts.emit(
                    Alert::new(
                        AlertKind::EventProcessingFailed,
                        format!("event {} failed: {}", event.id, e),
                    )
                    .with_context("event_id", event.id.clone())
                    .with_context("event_type", event.event_type.to_string()),
                );
                false
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "opaque panic payload".to_string());
                event.metadata.status = Some(EventStatus::Failed);
                event.metadata.error = Some(message.clone());
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.alerts.emit(
                    Alert::new(
                        AlertKind::WorkerError,
                        format!(
                            "{} processor panicked on event {}: {}",
                            self.event_type, event.id, message
                        ),
                    )
                    .with_context("event_id", event.id),
                );
                false
            }
        }
    }
}

/// Per-event-type queue consumer.
pub struct EventWorker {
    event_type: EventType,
    queue: Arc<EventQueue>,
    io_pool: Arc<IoThreadPool>,
    heavy: HeavyThresholds,
    heavy_batch_timeout: Duration,
    core: WorkerCore,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    alerts: AlertSink,
}

impl EventWorker {
    /// Create a worker bound to one event type and one queue.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_type: EventType,
        queue: Arc<EventQueue>,
        registry: Arc<ProcessorRegistry>,
        pool: Arc<BufferPool>,
        io_pool: Arc<IoThreadPool>,
        heavy: HeavyThresholds,
        heavy_batch_timeout: Duration,
        alerts: AlertSink,
    ) -> Self {
        Self {
            event_type,
            queue,
            io_pool,
            heavy,
            heavy_batch_timeout,
            core: WorkerCore {
                event_type,
                registry,
                pool,
                alerts: alerts.clone(),
                counters: Arc::new(WorkerCounters::default()),
            },
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
            alerts,
        }
    }

    /// Event type this worker is bound to.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Start the worker loop on the current runtime.
    pub fn start(&self) {
        let event_type = self.event_type;
        let queue = Arc::clone(&self.queue);
        let io_pool = Arc::clone(&self.io_pool);
        let heavy = self.heavy.clone();
        let heavy_batch_timeout = self.heavy_batch_timeout;
        let core = self.core.clone();
        let alerts = self.alerts.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            alerts.emit(
                Alert::new(
                    AlertKind::WorkerStarted,
                    format!("worker for {} started on queue '{}'", event_type, queue.name()),
                )
                .with_context("event_type", event_type.to_string()),
            );
            log::debug!("worker {} started", event_type);

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                if !queue.is_processing() {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(1)) => {}
                        _ = cancel.cancelled() => break,
                    }
                    continue;
                }

                let batch = queue.take_batch(&cancel).await;
                if batch.is_empty() {
                    continue;
                }
                let batch_size = batch.len();
                core.counters.batches.fetch_add(1, Ordering::Relaxed);

                let (heavy_events, light_events): (Vec<Event>, Vec<Event>) = batch
                    .into_iter()
                    .partition(|event| is_heavy(event, &heavy));

                let mut failures = core.process_grouped(light_events).await;
                if !heavy_events.is_empty() {
                    failures += dispatch_heavy(
                        &core,
                        &io_pool,
                        &alerts,
                        event_type,
                        heavy_events,
                        heavy_batch_timeout,
                    )
                    .await;
                }

                if failures == batch_size {
                    alerts.emit(
                        Alert::new(
                            AlertKind::BatchProcessingFailed,
                            format!(
                                "worker {} failed an entire batch of {}",
                                event_type, batch_size
                            ),
                        )
                        .with_measurement(failures as f64, batch_size as f64),
                    );
                }
            }
            log::debug!("worker {} stopped", event_type);
        });
        *self
            .handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
    }

    /// Whether the worker loop is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Cancel the loop and wait up to `timeout` for it to wind down. An
    /// overrunning loop is aborted after a [`AlertKind::WorkerStopTimeout`]
    /// alert.
    pub async fn stop(&self, timeout: Duration) {
        self.cancel.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                self.alerts.emit(
                    Alert::new(
                        AlertKind::WorkerStopTimeout,
                        format!("worker {} did not stop within {:?}", self.event_type, timeout),
                    )
                    .with_context("event_type", self.event_type.to_string()),
                );
                handle.abort();
            }
        }
    }

    /// Cancel and abort immediately.
    pub fn force_stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    /// Snapshot of counters.
    pub fn stats(&self) -> WorkerStats {
        let processed = self.core.counters.processed.load(Ordering::Relaxed);
        let busy_micros = self.core.counters.busy_micros.load(Ordering::Relaxed);
        WorkerStats {
            event_type: self.event_type.to_string(),
            processed,
            failed: self.core.counters.failed.load(Ordering::Relaxed),
            batches: self.core.counters.batches.load(Ordering::Relaxed),
            avg_processing_ms: if processed == 0 {
                0.0
            } else {
                busy_micros as f64 / processed as f64 / 1000.0
            },
            running: self.is_running(),
        }
    }
}

/// Heavy/light classification by event type and payload size.
fn is_heavy(event: &Event, thresholds: &HeavyThresholds) -> bool {
    match event.event_type {
        EventType::FileRead => {
            event.payload_len() > thresholds.file_read_payload
                || event.metadata.data_size.unwrap_or(0) > thresholds.file_read_size
        }
        EventType::FileWrite => event.payload_len() > thresholds.file_write_payload,
        EventType::Network => true,
        EventType::TextureShare => event.payload_len() > thresholds.texture_share_payload,
        _ => false,
    }
}

/// Run a heavy sub-batch on the dedicated pool, inline on its thread, and
/// wait for it with a deadline. A timeout is reported but the work keeps
/// running; only a rejected dispatch counts the events as failed.
async fn dispatch_heavy(
    core: &WorkerCore,
    io_pool: &IoThreadPool,
    alerts: &AlertSink,
    event_type: EventType,
    events: Vec<Event>,
    timeout: Duration,
) -> usize {
    let count = events.len();
    let runtime = tokio::runtime::Handle::current();
    let core = core.clone();
    let work = io_pool.execute(move || runtime.block_on(core.process_grouped(events)));

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(failures)) => failures,
        Ok(Err(e)) => {
            alerts.emit(
                Alert::new(
                    AlertKind::BackgroundIoThreadError,
                    format!("worker {} could not dispatch heavy batch: {}", event_type, e),
                )
                .with_measurement(count as f64, 0.0),
            );
            count
        }
        Err(_) => {
            alerts.emit(
                Alert::new(
                    AlertKind::HeavyIoProcessingTimeout,
                    format!(
                        "worker {} heavy batch of {} exceeded {:?}",
                        event_type, count, timeout
                    ),
                )
                .with_measurement(timeout.as_millis() as f64, timeout.as_millis() as f64),
            );
            0
        }
    }
}
