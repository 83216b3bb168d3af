//! Rollback points: timestamped copies of a file taken before a risky
//! modification, restorable on failure or operator request.
//!
//! A rollback point sits next to the original with a
//! `.rollback_YYYYMMDD_HHMMSSfff` suffix. The recovery log remembers every
//! point created in this process; completed records and their backup files
//! are purged by the manager's cleanup task.
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use chrono::Local;

use crate::error::{FramegateError, FramegateResult};

/// A single rollback point.
#[derive(Debug, Clone)]
pub struct RollbackPoint {
    /// The file the point protects.
    pub original: PathBuf,
    /// The timestamped copy.
    pub backup: PathBuf,
    /// When the point was created.
    pub created_at: SystemTime,
    /// Whether the protected modification finished and the point may be
    /// purged.
    pub completed: bool,
}

/// Process-wide log of rollback points.
#[derive(Default)]
pub struct RecoveryLog {
    points: Mutex<Vec<RollbackPoint>>,
}

impl RecoveryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RollbackPoint>> {
        self.points
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Copy `path` aside and record the point. The file must exist.
    pub async fn create_rollback_point(&self, path: &Path) -> FramegateResult<RollbackPoint> {
        if !tokio::fs::try_exists(path).await? {
            return Err(FramegateError::FileNotFound(
                path.to_string_lossy().into_owned(),
            ));
        }
        let stamp = Local::now().format("%Y%m%d_%H%M%S%3f");
        let mut backup = path.as_os_str().to_owned();
        backup.push(format!(".rollback_{}", stamp));
        let backup = PathBuf::from(backup);

        tokio::fs::copy(path, &backup).await?;
        log::debug!(
            "rollback point {} -> {}",
            path.display(),
            backup.display()
        );

        let point = RollbackPoint {
            original: path.to_path_buf(),
            backup,
            created_at: SystemTime::now(),
            completed: false,
        };
        self.lock().push(point.clone());
        Ok(point)
    }

    /// Restore the original from its rollback point.
    pub async fn restore(&self, point: &RollbackPoint) -> FramegateResult<()> {
        tokio::fs::copy(&point.backup, &point.original).await?;
        log::info!(
            "restored {} from rollback point {}",
            point.original.display(),
            point.backup.display()
        );
        Ok(())
    }

    /// Mark every point protecting `path` as completed.
    pub fn mark_completed(&self, path: &Path) {
        for point in self.lock().iter_mut() {
            if point.original == path {
                point.completed = true;
            }
        }
    }

    /// Remove completed records and delete their backup files (best effort).
    /// Returns how many records were purged.
    pub async fn purge_completed(&self) -> usize {
        let completed: Vec<RollbackPoint> = {
            let mut points = self.lock();
            let (done, pending): (Vec<_>, Vec<_>) =
                points.drain(..).partition(|p| p.completed);
            *points = pending;
            done
        };
        for point in &completed {
            if let Err(e) = tokio::fs::remove_file(&point.backup).await {
                log::debug!(
                    "could not remove rollback file {}: {}",
                    point.backup.display(),
                    e
                );
            }
        }
        completed.len()
    }

    /// Number of live (uncompleted) records.
    pub fn pending_count(&self) -> usize {
        self.lock().iter().filter(|p| !p.completed).count()
    }
}
