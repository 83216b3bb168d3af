//! Core of the isolation runtime.
//!
//! This module contains the event model and every component that moves
//! events from the host to completion:
//! - `event` for the typed, prioritized, cancellable unit of work
//! - `queue` for the bounded multi-priority buffer with batch take
//! - `pool` for reusable scratch buffers
//! - `worker` for the per-event-type queue consumers
//! - `io_pool` for the dedicated I/O threads heavy work is offloaded to
//! - `processor` for the pluggable per-type event handlers
//! - `manager` for the top-level owner the host talks to
//! - `alert` for the typed alert stream every component emits into

pub mod alert;
pub mod event;
pub mod io_pool;
pub mod manager;
pub mod pool;
pub mod processor;
pub mod queue;
pub mod worker;

pub use alert::{Alert, AlertKind, AlertSink};
pub use event::{Event, EventFlags, EventMetadata, EventPriority, EventStatus, EventType};
pub use io_pool::{IoPoolStats, IoThreadPool};
pub use manager::{
    FileOperation, IsolationManager, IsolationStats, QueueOutcome, ResourceHandle,
};
pub use pool::{BufferPool, PoolStats};
pub use processor::{
    EventProcessor, FileEventProcessor, PassthroughProcessor, ProcessorRegistry,
};
pub use queue::{EventQueue, QueueStats};
pub use worker::{EventWorker, WorkerStats};
