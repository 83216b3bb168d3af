//! Progress tracking and cancellation handles for in-flight operations.
//!
//! Each operation owns its record and is the only writer; readers may see a
//! stale percentage. Records live from enqueue to completion or
//! cancellation. Cancelling is idempotent, and cancelling an operation that
//! already completed is a no-op.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Snapshot of one in-flight operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationProgress {
    /// Operation identifier.
    pub operation_id: String,
    /// Completion percentage in `[0, 100]`.
    pub percent: f64,
    /// Human-readable phase description.
    pub status: String,
    /// When the operation was registered.
    pub started_at: SystemTime,
    /// When the record was last written.
    pub updated_at: SystemTime,
}

struct TrackedOperation {
    progress: OperationProgress,
    cancel: CancellationToken,
}

/// Concurrent registry of in-flight operations.
#[derive(Default)]
pub struct ProgressTracker {
    inner: Mutex<HashMap<String, TrackedOperation>>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TrackedOperation>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register an operation under the given id with its cancellation token.
    /// Re-registering an id replaces the stale record.
    pub fn register(&self, operation_id: &str, cancel: CancellationToken) {
        let now = SystemTime::now();
        self.lock().insert(
            operation_id.to_string(),
            TrackedOperation {
                progress: OperationProgress {
                    operation_id: operation_id.to_string(),
                    percent: 0.0,
                    status: "queued".to_string(),
                    started_at: now,
                    updated_at: now,
                },
                cancel,
            },
        );
    }

    /// Update percentage and status. Unknown ids are ignored (the operation
    /// already completed).
    pub fn update(&self, operation_id: &str, percent: f64, status: &str) {
        if let Some(tracked) = self.lock().get_mut(operation_id) {
            tracked.progress.percent = percent.clamp(0.0, 100.0);
            tracked.progress.status = status.to_string();
            tracked.progress.updated_at = SystemTime::now();
        }
    }

    /// Read a snapshot of an operation's progress.
    pub fn get(&self, operation_id: &str) -> Option<OperationProgress> {
        self.lock().get(operation_id).map(|t| t.progress.clone())
    }

    /// Remove the record; called on completion or after cancellation has
    /// been observed by the operation.
    pub fn complete(&self, operation_id: &str) {
        self.lock().remove(operation_id);
    }

    /// Fire the operation's cancellation token. Returns whether the
    /// operation was still in flight. Safe to call repeatedly and after
    /// completion.
    pub fn cancel(&self, operation_id: &str) -> bool {
        match self.lock().get(operation_id) {
            Some(tracked) => {
                tracked.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of operations currently tracked.
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshots of every in-flight operation.
    pub fn snapshot(&self) -> Vec<OperationProgress> {
        self.lock().values().map(|t| t.progress.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_update_complete() {
        let tracker = ProgressTracker::new();
        let token = CancellationToken::new();
        tracker.register("op-1", token);
        assert_eq!(tracker.active_count(), 1);

        tracker.update("op-1", 55.0, "writing chunk 5");
        let progress = tracker.get("op-1").unwrap();
        assert_eq!(progress.percent, 55.0);
        assert_eq!(progress.status, "writing chunk 5");

        tracker.complete("op-1");
        assert!(tracker.get("op-1").is_none());
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_percent_is_clamped() {
        let tracker = ProgressTracker::new();
        tracker.register("op-1", CancellationToken::new());
        tracker.update("op-1", 150.0, "overshoot");
        assert_eq!(tracker.get("op-1").unwrap().percent, 100.0);
        tracker.update("op-1", -3.0, "undershoot");
        assert_eq!(tracker.get("op-1").unwrap().percent, 0.0);
    }

    #[test]
    fn test_cancel_fires_token_and_is_idempotent() {
        let tracker = ProgressTracker::new();
        let token = CancellationToken::new();
        tracker.register("op-1", token.clone());

        assert!(tracker.cancel("op-1"));
        assert!(token.is_cancelled());
        // Repeated cancel is a harmless no-op.
        assert!(tracker.cancel("op-1"));

        tracker.complete("op-1");
        // Cancel after completion is a no-op.
        assert!(!tracker.cancel("op-1"));
    }

    #[test]
    fn test_update_after_complete_is_ignored() {
        let tracker = ProgressTracker::new();
        tracker.register("op-1", CancellationToken::new());
        tracker.complete("op-1");
        tracker.update("op-1", 80.0, "late");
        assert!(tracker.get("op-1").is_none());
    }
}
