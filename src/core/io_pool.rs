//! Dedicated I/O thread pool kept off the async runtime's scheduler.
//!
//! Heavy operations run on a fixed set of named OS threads fed by a bounded
//! channel, so a slow disk or a saturated network path never steals a worker
//! from the host-facing runtime. Tasks execute inline on the dedicated
//! thread; they are never re-dispatched onto another executor.
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::core::alert::{Alert, AlertKind, AlertSink};
use crate::error::{FramegateError, FramegateResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Snapshot of thread pool occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct IoPoolStats {
    /// Number of pool threads.
    pub threads: usize,
    /// Tasks currently executing.
    pub active: usize,
    /// Tasks completed since construction.
    pub completed: u64,
    /// Tasks that panicked on a pool thread.
    pub panicked: u64,
    /// Submissions rejected because the channel was full.
    pub rejected: u64,
}

/// Fixed set of dedicated I/O threads fed by a bounded task channel.
pub struct IoThreadPool {
    name: String,
    tx: Mutex<Option<SyncSender<Job>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    thread_count: usize,
    active: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
    panicked: Arc<AtomicU64>,
    rejected: AtomicU64,
    shutdown_grace: Duration,
    alerts: AlertSink,
}

impl IoThreadPool {
    /// Spawn `threads` dedicated I/O threads.
    ///
    /// Fails with [`FramegateError::Initialization`] if any thread cannot be
    /// spawned; already-started threads are shut down again in that case.
    pub fn new(
        name: impl Into<String>,
        threads: usize,
        shutdown_grace: Duration,
        alerts: AlertSink,
    ) -> FramegateResult<Self> {
        let name = name.into();
        // Queue deep enough that bursts queue instead of failing, while a
        // stalled pool still surfaces backpressure to callers.
        let (tx, rx) = std::sync::mpsc::sync_channel::<Job>(threads * 32);
        let rx = Arc::new(Mutex::new(rx));

        let active = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicU64::new(0));
        let panicked = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let rx = Arc::clone(&rx);
            let active = Arc::clone(&active);
            let completed = Arc::clone(&completed);
            let panicked = Arc::clone(&panicked);
            let worker_alerts = alerts.clone();
            let thread_name = format!("{}-{}", name, index);
            let spawn_result = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker_loop(rx, active, completed, panicked, worker_alerts));
            match spawn_result {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    alerts.emit(Alert::new(
                        AlertKind::IoThreadPoolInitFailed,
                        format!("failed to spawn {}: {}", thread_name, e),
                    ));
                    drop(tx);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(FramegateError::initialization(format!(
                        "I/O thread pool '{}' failed to start: {}",
                        name, e
                    )));
                }
            }
        }

        alerts.emit(
            Alert::new(
                AlertKind::IoThreadPoolInitialized,
                format!("I/O thread pool '{}' started", name),
            )
            .with_context("threads", threads.to_string()),
        );
        log::info!("I/O thread pool '{}' started with {} threads", name, threads);

        Ok(Self {
            name,
            tx: Mutex::new(Some(tx)),
            threads: Mutex::new(handles),
            thread_count: threads,
            active,
            completed,
            panicked,
            rejected: AtomicU64::new(0),
            shutdown_grace,
            alerts,
        })
    }

    /// Submit a closure without waiting for its completion.
    pub fn try_submit(&self, job: Job) -> FramegateResult<()> {
        let guard = self
            .tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let tx = guard.as_ref().ok_or_else(|| {
            FramegateError::thread_pool(format!("pool '{}' is shut down", self.name))
        })?;
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                self.alerts.emit(
                    Alert::new(
                        AlertKind::ThreadPoolExhaustion,
                        format!("pool '{}' task channel full", self.name),
                    )
                    .with_context("pool", self.name.clone()),
                );
                Err(FramegateError::thread_pool(format!(
                    "pool '{}' task channel full",
                    self.name
                )))
            }
            Err(TrySendError::Disconnected(_)) => Err(FramegateError::thread_pool(format!(
                "pool '{}' workers are gone",
                self.name
            ))),
        }
    }

    /// Run a closure on a dedicated thread and await its result.
    pub async fn execute<F, T>(&self, f: F) -> FramegateResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.try_submit(Box::new(move || {
            let _ = tx.send(f());
        }))?;
        rx.await.map_err(|_| {
            FramegateError::thread_pool(format!(
                "task on pool '{}' died before reporting a result",
                self.name
            ))
        })
    }

    /// Snapshot of occupancy and counters.
    pub fn stats(&self) -> IoPoolStats {
        IoPoolStats {
            threads: self.thread_count,
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work and wait for threads to drain, up to the grace
    /// period per thread. Threads that overrun are abandoned.
    pub async fn shutdown(&self) {
        {
            let mut guard = self
                .tx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.take();
        }
        let handles = {
            let mut guard = self
                .threads
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            let deadline = std::time::Instant::now() + self.shutdown_grace;
            while !handle.is_finished() && std::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                self.alerts.emit(
                    Alert::new(
                        AlertKind::WorkerDisposeError,
                        format!("pool '{}' thread did not exit in time, abandoned", self.name),
                    )
                    .with_context("pool", self.name.clone()),
                );
                log::warn!("pool '{}' abandoned a thread at shutdown", self.name);
            }
        }
    }
}

fn worker_loop(
    rx: Arc<Mutex<Receiver<Job>>>,
    active: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
    panicked: Arc<AtomicU64>,
    alerts: AlertSink,
) {
    loop {
        let job = {
            let guard = rx.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.recv()
        };
        let Ok(job) = job else {
            // Sender dropped: shutdown.
            return;
        };
        active.fetch_add(1, Ordering::Relaxed);
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(job));
        active.fetch_sub(1, Ordering::Relaxed);
        match outcome {
            Ok(()) => {
                completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                panicked.fetch_add(1, Ordering::Relaxed);
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "opaque panic payload".to_string());
                alerts.emit(Alert::new(
                    AlertKind::IoThreadWorkerError,
                    format!("task panicked on I/O thread: {}", message),
                ));
                log::error!("task panicked on I/O thread: {}", message);
            }
        }
    }
}
