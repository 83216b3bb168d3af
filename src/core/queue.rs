//! Bounded multi-priority event queue with batch take and backpressure.
//!
//! The queue keeps two views of the same events: one total FIFO list (the
//! throughput path, drained by batch takes) and one small id sub-queue per
//! priority band (the latency path, drained by priority takes). Producers
//! append to both; consumers remove from both. The sub-queues hold only ids
//! and stay small relative to batch size, so the linear re-scan on removal
//! is bounded.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::core::alert::{Alert, AlertKind, AlertSink};
use crate::core::event::{Event, EventPriority};
use crate::error::FramegateResult;

/// Snapshot of queue state and cumulative counters.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Queue name.
    pub name: String,
    /// Current depth across all priority bands.
    pub depth: usize,
    /// Capacity bound.
    pub capacity: usize,
    /// Depth per priority band, Critical first.
    pub depth_by_priority: [usize; 4],
    /// Events accepted since construction.
    pub total_added: u64,
    /// Events handed to consumers since construction.
    pub total_taken: u64,
    /// Enqueue attempts rejected at capacity.
    pub total_rejected: u64,
    /// Batch takes completed.
    pub total_batches: u64,
    /// Whether consumers should be draining the queue.
    pub processing: bool,
}

struct QueueInner {
    total: VecDeque<Event>,
    by_priority: [VecDeque<String>; 4],
}

impl QueueInner {
    fn new() -> Self {
        Self {
            total: VecDeque::new(),
            by_priority: std::array::from_fn(|_| VecDeque::new()),
        }
    }

    fn len(&self) -> usize {
        self.total.len()
    }

    fn push(&mut self, event: Event) {
        self.by_priority[event.priority.index()].push_back(event.id.clone());
        self.total.push_back(event);
    }

    /// FIFO removal from the total list, keeping the priority view in sync.
    fn pop_fifo(&mut self) -> Option<Event> {
        let event = self.total.pop_front()?;
        let band = &mut self.by_priority[event.priority.index()];
        if let Some(pos) = band.iter().position(|id| *id == event.id) {
            band.remove(pos);
        }
        Some(event)
    }

    /// Removal from the highest non-empty priority band, keeping the total
    /// list in sync. Returns `None` when empty, `Some(Err(id))` when the
    /// views disagree.
    fn pop_priority(&mut self) -> Option<Result<Event, String>> {
        for priority in EventPriority::ALL {
            if let Some(id) = self.by_priority[priority.index()].pop_front() {
                return match self.total.iter().position(|e| e.id == id) {
                    Some(pos) => Some(Ok(self.total.remove(pos).expect("position just found"))),
                    None => Some(Err(id)),
                };
            }
        }
        None
    }

    fn clear(&mut self) -> usize {
        let dropped = self.total.len();
        self.total.clear();
        for band in &mut self.by_priority {
            band.clear();
        }
        dropped
    }
}

/// Bounded FIFO-within-priority event buffer.
pub struct EventQueue {
    name: String,
    capacity: usize,
    max_batch_size: usize,
    batch_timeout: Duration,
    inner: Mutex<QueueInner>,
    data_available: Notify,
    space_available: Notify,
    processing: AtomicBool,
    alerts: AlertSink,
    total_added: AtomicU64,
    total_taken: AtomicU64,
    total_rejected: AtomicU64,
    total_batches: AtomicU64,
}

impl EventQueue {
    /// Create a queue with the given total capacity and batching policy.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        max_batch_size: usize,
        batch_timeout: Duration,
        alerts: AlertSink,
    ) -> Self {
        Self {
            name: name.into(),
            capacity,
            max_batch_size,
            batch_timeout,
            inner: Mutex::new(QueueInner::new()),
            data_available: Notify::new(),
            space_available: Notify::new(),
            processing: AtomicBool::new(false),
            alerts,
            total_added: AtomicU64::new(0),
            total_taken: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            total_batches: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        // A panicked producer must not wedge every consumer.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current depth.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try to enqueue an event, waiting up to `timeout` for space.
    ///
    /// Returns `Ok(false)` and emits a single [`AlertKind::QueueFull`] alert
    /// when capacity is not released within the timeout. The rejection is a
    /// soft failure; the queue stays usable.
    pub async fn try_add(&self, event: Event, timeout: Duration) -> FramegateResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut inner = self.lock();
                if inner.len() < self.capacity {
                    inner.push(event);
                    drop(inner);
                    self.total_added.fetch_add(1, Ordering::Relaxed);
                    self.data_available.notify_one();
                    return Ok(true);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                self.alerts.emit(
                    Alert::new(
                        AlertKind::QueueFull,
                        format!("queue '{}' full, enqueue timed out", self.name),
                    )
                    .with_measurement(self.capacity as f64, self.capacity as f64)
                    .with_context("queue", self.name.clone())
                    .with_context("event_id", event.id.clone()),
                );
                log::warn!(
                    "queue '{}' rejected event {} after {:?}",
                    self.name,
                    event.id,
                    timeout
                );
                return Ok(false);
            }
            tokio::select! {
                _ = self.space_available.notified() => {}
                _ = tokio::time::sleep(deadline - now) => {}
            }
        }
    }

    fn try_take_fifo(&self) -> Option<Event> {
        let event = self.lock().pop_fifo();
        if event.is_some() {
            self.total_taken.fetch_add(1, Ordering::Relaxed);
            self.space_available.notify_one();
        }
        event
    }

    /// Take the oldest event, blocking until one is available or the
    /// cancellation token fires.
    pub async fn take(&self, cancel: &CancellationToken) -> Option<Event> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(event) = self.try_take_fifo() {
                return Some(event);
            }
            tokio::select! {
                _ = self.data_available.notified() => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Take a batch of 1 to `max_batch_size` events.
    ///
    /// Blocks until the first event arrives (or cancellation), then spends at
    /// most `batch_timeout` topping the batch up. Returns an empty batch only
    /// on cancellation.
    pub async fn take_batch(&self, cancel: &CancellationToken) -> Vec<Event> {
        let mut batch = Vec::with_capacity(self.max_batch_size);
        match self.take(cancel).await {
            Some(event) => batch.push(event),
            None => return batch,
        }
        let deadline = Instant::now() + self.batch_timeout;
        while batch.len() < self.max_batch_size {
            if let Some(event) = self.try_take_fifo() {
                batch.push(event);
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::select! {
                _ = self.data_available.notified() => {}
                _ = tokio::time::sleep(deadline - now) => break,
                _ = cancel.cancelled() => break,
            }
        }
        self.total_batches.fetch_add(1, Ordering::Relaxed);
        batch
    }

    /// Take the oldest event from the highest non-empty priority band,
    /// blocking until one is available or the cancellation token fires.
    pub async fn take_priority(&self, cancel: &CancellationToken) -> Option<Event> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            loop {
                match self.lock().pop_priority() {
                    Some(Ok(event)) => {
                        self.total_taken.fetch_add(1, Ordering::Relaxed);
                        self.space_available.notify_one();
                        return Some(event);
                    }
                    Some(Err(orphan_id)) => {
                        // Views disagreed; drop the orphan id and keep draining.
                        self.alerts.emit(
                            Alert::new(
                                AlertKind::PriorityTakeFailed,
                                format!("queue '{}' dropped orphaned id {}", self.name, orphan_id),
                            )
                            .with_context("queue", self.name.clone()),
                        );
                    }
                    None => break,
                }
            }
            tokio::select! {
                _ = self.data_available.notified() => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Drop every queued event. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.lock().clear();
        if dropped > 0 {
            self.space_available.notify_waiters();
        }
        dropped
    }

    /// Mark the queue as actively consumed. Workers back off while unset.
    pub fn start_processing(&self) {
        self.processing.store(true, Ordering::SeqCst);
    }

    /// Mark the queue as paused.
    pub fn stop_processing(&self) {
        self.processing.store(false, Ordering::SeqCst);
    }

    /// Whether consumers should be draining the queue.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Snapshot of state and counters.
    pub fn stats(&self) -> QueueStats {
        let inner = self.lock();
        QueueStats {
            name: self.name.clone(),
            depth: inner.len(),
            capacity: self.capacity,
            depth_by_priority: std::array::from_fn(|i| inner.by_priority[i].len()),
            total_added: self.total_added.load(Ordering::Relaxed),
            total_taken: self.total_taken.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_batches: self.total_batches.load(Ordering::Relaxed),
            processing: self.processing.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::EventType;

    fn test_queue(capacity: usize) -> EventQueue {
        EventQueue::new(
            "test",
            capacity,
            10,
            Duration::from_millis(16),
            AlertSink::new(64),
        )
    }

    fn event(priority: EventPriority) -> Event {
        Event::new(EventType::CacheUpdate, priority)
    }

    #[tokio::test]
    async fn test_add_and_take_fifo_order() {
        let queue = test_queue(10);
        let first = event(EventPriority::Low);
        let first_id = first.id.clone();
        queue
            .try_add(first, Duration::from_millis(10))
            .await
            .unwrap();
        queue
            .try_add(event(EventPriority::Critical), Duration::from_millis(10))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let taken = queue.take(&cancel).await.unwrap();
        // FIFO path ignores priority.
        assert_eq!(taken.id, first_id);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_take_priority_prefers_critical() {
        let queue = test_queue(100);
        for _ in 0..5 {
            queue
                .try_add(event(EventPriority::Medium), Duration::from_millis(10))
                .await
                .unwrap();
        }
        let critical = event(EventPriority::Critical);
        let critical_id = critical.id.clone();
        queue
            .try_add(critical, Duration::from_millis(10))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let taken = queue.take_priority(&cancel).await.unwrap();
        assert_eq!(taken.id, critical_id);
    }

    #[tokio::test]
    async fn test_take_priority_fifo_within_band() {
        let queue = test_queue(100);
        let a = event(EventPriority::High);
        let a_id = a.id.clone();
        queue.try_add(a, Duration::from_millis(10)).await.unwrap();
        queue
            .try_add(event(EventPriority::High), Duration::from_millis(10))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        assert_eq!(queue.take_priority(&cancel).await.unwrap().id, a_id);
    }

    #[tokio::test]
    async fn test_capacity_rejection_emits_queue_full() {
        let queue = test_queue(2);
        let mut sink_rx = queue.alerts.subscribe();
        assert!(
            queue
                .try_add(event(EventPriority::Low), Duration::from_millis(5))
                .await
                .unwrap()
        );
        assert!(
            queue
                .try_add(event(EventPriority::Low), Duration::from_millis(5))
                .await
                .unwrap()
        );
        assert!(
            !queue
                .try_add(event(EventPriority::Low), Duration::from_millis(5))
                .await
                .unwrap()
        );
        let alert = sink_rx.try_recv().unwrap();
        assert_eq!(alert.kind, AlertKind::QueueFull);
        assert!(sink_rx.try_recv().is_err(), "exactly one QueueFull alert");
        assert_eq!(queue.stats().total_rejected, 1);
    }

    #[tokio::test]
    async fn test_add_unblocks_when_space_freed() {
        let queue = std::sync::Arc::new(test_queue(1));
        queue
            .try_add(event(EventPriority::Low), Duration::from_millis(5))
            .await
            .unwrap();

        let q = queue.clone();
        let producer = tokio::spawn(async move {
            q.try_add(event(EventPriority::Low), Duration::from_millis(500))
                .await
                .unwrap()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let cancel = CancellationToken::new();
        queue.take(&cancel).await.unwrap();
        assert!(producer.await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_respects_max_size() {
        let queue = test_queue(100);
        for _ in 0..15 {
            queue
                .try_add(event(EventPriority::Medium), Duration::from_millis(10))
                .await
                .unwrap();
        }
        let cancel = CancellationToken::new();
        let batch = queue.take_batch(&cancel).await;
        assert_eq!(batch.len(), 10);
        let rest = queue.take_batch(&cancel).await;
        assert_eq!(rest.len(), 5);
    }

    #[tokio::test]
    async fn test_batch_returns_short_when_queue_drains() {
        let queue = test_queue(100);
        queue
            .try_add(event(EventPriority::Medium), Duration::from_millis(10))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let batch = queue.take_batch(&cancel).await;
        assert_eq!(batch.len(), 1);
        // Must not block much longer than the batch timeout after the first take.
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_take_respects_cancellation() {
        let queue = test_queue(10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(queue.take(&cancel).await.is_none());
        assert!(queue.take_batch(&cancel).await.is_empty());
        assert!(queue.take_priority(&cancel).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let queue = test_queue(10);
        for _ in 0..3 {
            queue
                .try_add(event(EventPriority::High), Duration::from_millis(10))
                .await
                .unwrap();
        }
        let stats = queue.stats();
        assert_eq!(stats.depth, 3);
        assert_eq!(stats.depth_by_priority[EventPriority::High.index()], 3);
        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_processing_flag() {
        let queue = test_queue(10);
        assert!(!queue.is_processing());
        queue.start_processing();
        assert!(queue.is_processing());
        queue.stop_processing();
        assert!(!queue.is_processing());
    }
}
