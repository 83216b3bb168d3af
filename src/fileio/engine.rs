//! Asynchronous file engine: chunked, cancellable, retried file operations
//! with per-path mutual exclusion and crash-safe atomic writes.
//!
//! Every operation is admitted through a bounded queue (a semaphore sized at
//! twice the concurrency cap, full means wait), then through the concurrency
//! semaphore itself, then serialised per path. I/O happens in chunks so that
//! progress is observable and cancellation is honored between chunks rather
//! than at operation granularity.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::{FileEngineSettings, RetrySettings};
use crate::core::alert::{Alert, AlertKind, AlertSink};
use crate::core::io_pool::IoThreadPool;
use crate::error::{FramegateError, FramegateResult};
use crate::fileio::progress::ProgressTracker;
use crate::fileio::retry::{RetryPolicy, retry_with_backoff};
use crate::fileio::rollback::RecoveryLog;
use crate::fileio::validation::{PathRole, validate_path};

/// Result of a completed read.
#[derive(Debug)]
pub struct ReadOutcome {
    /// Operation identifier.
    pub operation_id: String,
    /// File contents.
    pub data: Vec<u8>,
    /// Bytes read.
    pub bytes_read: u64,
    /// Wall-clock duration of the operation.
    pub elapsed: Duration,
}

/// Result of a completed write.
#[derive(Debug)]
pub struct WriteOutcome {
    /// Operation identifier.
    pub operation_id: String,
    /// Bytes committed to the target.
    pub bytes_written: u64,
    /// Whether a backup of the prior content was taken.
    pub backup_created: bool,
    /// Wall-clock duration of the operation.
    pub elapsed: Duration,
}

/// Result of a completed copy.
#[derive(Debug)]
pub struct CopyOutcome {
    /// Operation identifier.
    pub operation_id: String,
    /// Bytes copied.
    pub bytes_copied: u64,
    /// Wall-clock duration of the operation.
    pub elapsed: Duration,
}

/// Result of a completed delete.
#[derive(Debug)]
pub struct DeleteOutcome {
    /// Operation identifier.
    pub operation_id: String,
    /// Whether the file existed.
    pub existed: bool,
    /// Size of the removed file.
    pub bytes_freed: u64,
    /// Whether the removal ran on the I/O thread pool.
    pub offloaded: bool,
    /// Wall-clock duration of the operation.
    pub elapsed: Duration,
}

/// Result of a completed enumeration.
#[derive(Debug)]
pub struct EnumerateOutcome {
    /// Operation identifier.
    pub operation_id: String,
    /// Absolute paths of matching files.
    pub files: Vec<PathBuf>,
    /// Wall-clock duration of the operation.
    pub elapsed: Duration,
}

/// Non-blocking file operation engine with atomic write semantics.
pub struct AsyncFileEngine {
    settings: FileEngineSettings,
    retry: RetrySettings,
    concurrency: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    path_locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
    tracker: Arc<ProgressTracker>,
    recovery: Arc<RecoveryLog>,
    io_pool: Arc<IoThreadPool>,
    temp_dir: PathBuf,
    alerts: AlertSink,
}

impl AsyncFileEngine {
    /// Create an engine with its process-private temp directory.
    pub fn new(
        settings: FileEngineSettings,
        retry: RetrySettings,
        io_pool: Arc<IoThreadPool>,
        tracker: Arc<ProgressTracker>,
        alerts: AlertSink,
    ) -> FramegateResult<Self> {
        let temp_dir = std::env::temp_dir().join(format!("framegate-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&temp_dir).map_err(|e| {
            FramegateError::initialization(format!(
                "could not create temp directory {}: {}",
                temp_dir.display(),
                e
            ))
        })?;
        log::debug!("file engine temp directory: {}", temp_dir.display());
        Ok(Self {
            concurrency: Arc::new(Semaphore::new(settings.max_concurrent)),
            admission: Arc::new(Semaphore::new(settings.max_concurrent * 2)),
            settings,
            retry,
            path_locks: Mutex::new(HashMap::new()),
            tracker,
            recovery: Arc::new(RecoveryLog::new()),
            io_pool,
            temp_dir,
            alerts,
        })
    }

    /// Progress tracker shared with the isolation manager.
    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    /// Recovery log of rollback points.
    pub fn recovery(&self) -> Arc<RecoveryLog> {
        Arc::clone(&self.recovery)
    }

    /// The engine's private temp directory.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Read a file in chunks.
    pub async fn read(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<ReadOutcome> {
        let started = Instant::now();
        let result = self.read_inner(path, cancel, operation_id).await;
        self.finish(operation_id, "read", path, &result);
        let data = result?;
        Ok(ReadOutcome {
            operation_id: operation_id.to_string(),
            bytes_read: data.len() as u64,
            data,
            elapsed: started.elapsed(),
        })
    }

    async fn read_inner(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<Vec<u8>> {
        validate_path(path, PathRole::File)?;
        self.tracker.register(operation_id, cancel.clone());
        let _permits = self.admit().await?;
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        let policy = RetryPolicy::from_settings(&self.retry, self.retry.max_attempts);
        self.with_timeout(self.settings.read_timeout, "read", path, async {
            retry_with_backoff(
                || self.read_attempt(path, cancel, operation_id),
                &policy,
                self.retry_predicate(operation_id, "read"),
            )
            .await
        })
        .await
    }

    async fn read_attempt(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<Vec<u8>> {
        let mut file = tokio::fs::File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FramegateError::FileNotFound(path.to_string_lossy().into_owned())
            } else {
                e.into()
            }
        })?;
        let total = file.metadata().await?.len();
        let mut data = Vec::with_capacity(total as usize);
        let mut chunk = vec![0u8; self.settings.chunk_size];
        let mut read_total = 0u64;
        loop {
            self.check_cancel(cancel, operation_id)?;
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
            read_total += n as u64;
            let percent = if total == 0 {
                100.0
            } else {
                read_total as f64 * 100.0 / total as f64
            };
            self.report(operation_id, percent, "reading");
        }
        Ok(data)
    }

    /// Write a file atomically: the target ends up with either the new bytes
    /// or its prior content, never a partial state.
    pub async fn write(
        &self,
        path: &Path,
        bytes: &[u8],
        create_backup: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<WriteOutcome> {
        let started = Instant::now();
        let result = self
            .write_inner(path, bytes, create_backup, cancel, operation_id)
            .await;
        self.finish(operation_id, "write", path, &result);
        let backup_created = result?;
        Ok(WriteOutcome {
            operation_id: operation_id.to_string(),
            bytes_written: bytes.len() as u64,
            backup_created,
            elapsed: started.elapsed(),
        })
    }

    async fn write_inner(
        &self,
        path: &Path,
        bytes: &[u8],
        create_backup: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<bool> {
        validate_path(path, PathRole::File)?;
        self.tracker.register(operation_id, cancel.clone());
        let _permits = self.admit().await?;
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        let policy = RetryPolicy::from_settings(&self.retry, self.retry.max_attempts);
        self.with_timeout(self.settings.write_timeout, "write", path, async {
            retry_with_backoff(
                || self.write_attempt(path, bytes, create_backup, cancel, operation_id),
                &policy,
                self.retry_predicate(operation_id, "write"),
            )
            .await
        })
        .await
    }

    async fn write_attempt(
        &self,
        path: &Path,
        bytes: &[u8],
        create_backup: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<bool> {
        let temp = self
            .temp_dir
            .join(format!("{}-{}.tmp", operation_id, Uuid::new_v4()));

        // Stage the payload into the temp file; the target stays untouched
        // until the commit below, so cancellation here has no side effect
        // beyond the temp file itself.
        let staged = self
            .stage_payload(&temp, bytes, cancel, operation_id)
            .await;
        if let Err(e) = staged {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }

        let existed = tokio::fs::try_exists(path).await?;
        let backup = if create_backup && existed {
            let backup = self
                .temp_dir
                .join(format!("{}-{}.bak", operation_id, Uuid::new_v4()));
            if let Err(e) = tokio::fs::copy(path, &backup).await {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(e.into());
            }
            Some(backup)
        } else {
            None
        };

        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_file(&temp).await;
            if let Some(backup) = &backup {
                let _ = tokio::fs::remove_file(backup).await;
            }
            return Err(FramegateError::cancelled(operation_id));
        }

        // Commit: rename over the target where the platform allows it, fall
        // back to the ordered delete-then-rename, and to a copy when the
        // temp root lives on a different volume.
        let commit = match tokio::fs::rename(&temp, path).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let replace = async {
                    if existed {
                        tokio::fs::remove_file(path).await?;
                    }
                    match tokio::fs::rename(&temp, path).await {
                        Ok(()) => Ok(()),
                        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                            tokio::fs::copy(&temp, path).await?;
                            let _ = tokio::fs::remove_file(&temp).await;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                };
                replace.await
            }
        };

        if let Err(e) = commit {
            if let Some(backup) = &backup {
                if let Err(restore_err) = tokio::fs::copy(backup, path).await {
                    log::error!(
                        "failed to restore {} from backup: {}",
                        path.display(),
                        restore_err
                    );
                } else {
                    log::warn!("write failed, restored {} from backup", path.display());
                }
            }
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        if let Some(backup) = backup {
            let _ = tokio::fs::remove_file(backup).await;
            self.report(operation_id, 100.0, "written");
            return Ok(true);
        }
        self.report(operation_id, 100.0, "written");
        Ok(false)
    }

    async fn stage_payload(
        &self,
        temp: &Path,
        bytes: &[u8],
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<()> {
        let mut file = tokio::fs::File::create(temp).await?;
        let mut written = 0usize;
        for chunk in bytes.chunks(self.settings.chunk_size.max(1)) {
            self.check_cancel(cancel, operation_id)?;
            file.write_all(chunk).await?;
            written += chunk.len();
            let percent = if bytes.is_empty() {
                90.0
            } else {
                written as f64 * 90.0 / bytes.len() as f64
            };
            self.report(operation_id, percent, "staging");
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Copy a file in chunks. A cancelled copy removes the partial
    /// destination.
    pub async fn copy(
        &self,
        src: &Path,
        dst: &Path,
        overwrite: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<CopyOutcome> {
        let started = Instant::now();
        let result = self
            .copy_inner(src, dst, overwrite, cancel, operation_id)
            .await;
        self.finish(operation_id, "copy", dst, &result);
        let bytes_copied = result?;
        Ok(CopyOutcome {
            operation_id: operation_id.to_string(),
            bytes_copied,
            elapsed: started.elapsed(),
        })
    }

    async fn copy_inner(
        &self,
        src: &Path,
        dst: &Path,
        overwrite: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<u64> {
        validate_path(src, PathRole::File)?;
        validate_path(dst, PathRole::File)?;
        self.tracker.register(operation_id, cancel.clone());
        let _permits = self.admit().await?;

        // Both paths are locked in canonical (lexicographic) order so two
        // concurrent copies with swapped endpoints cannot deadlock.
        let src_key = absolute_key(src);
        let dst_key = absolute_key(dst);
        let (first, second) = if src_key <= dst_key {
            (src, dst)
        } else {
            (dst, src)
        };
        let first_lock = self.path_lock(first);
        let _first_guard = first_lock.lock().await;
        let second_lock = if absolute_key(first) != absolute_key(second) {
            Some(self.path_lock(second))
        } else {
            None
        };
        let _second_guard = match &second_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        if !overwrite && tokio::fs::try_exists(dst).await? {
            return Err(FramegateError::FileAlreadyExists(
                dst.to_string_lossy().into_owned(),
            ));
        }

        let policy = RetryPolicy::from_settings(&self.retry, self.retry.bulk_max_attempts);
        self.with_timeout(self.settings.copy_timeout, "copy", dst, async {
            retry_with_backoff(
                || self.copy_attempt(src, dst, cancel, operation_id),
                &policy,
                self.retry_predicate(operation_id, "copy"),
            )
            .await
        })
        .await
    }

    async fn copy_attempt(
        &self,
        src: &Path,
        dst: &Path,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<u64> {
        let mut reader = tokio::fs::File::open(src).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FramegateError::FileNotFound(src.to_string_lossy().into_owned())
            } else {
                e.into()
            }
        })?;
        let total = reader.metadata().await?.len();
        let mut writer = tokio::fs::File::create(dst).await?;
        let mut chunk = vec![0u8; self.settings.chunk_size];
        let mut copied = 0u64;
        loop {
            if cancel.is_cancelled() {
                drop(writer);
                let _ = tokio::fs::remove_file(dst).await;
                return Err(FramegateError::cancelled(operation_id));
            }
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&chunk[..n]).await?;
            copied += n as u64;
            let percent = if total == 0 {
                100.0
            } else {
                copied as f64 * 100.0 / total as f64
            };
            self.report(operation_id, percent, "copying");
        }
        writer.flush().await?;
        writer.sync_all().await?;
        Ok(copied)
    }

    /// Delete a file. Files above the large-delete threshold are removed on
    /// the dedicated I/O thread pool.
    pub async fn delete(
        &self,
        path: &Path,
        verify_exists: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<DeleteOutcome> {
        let started = Instant::now();
        let result = self
            .delete_inner(path, verify_exists, cancel, operation_id)
            .await;
        self.finish(operation_id, "delete", path, &result);
        let (existed, bytes_freed, offloaded) = result?;
        Ok(DeleteOutcome {
            operation_id: operation_id.to_string(),
            existed,
            bytes_freed,
            offloaded,
            elapsed: started.elapsed(),
        })
    }

    async fn delete_inner(
        &self,
        path: &Path,
        verify_exists: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<(bool, u64, bool)> {
        validate_path(path, PathRole::File)?;
        self.tracker.register(operation_id, cancel.clone());
        let _permits = self.admit().await?;
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        let policy = RetryPolicy::from_settings(&self.retry, self.retry.max_attempts);
        self.with_timeout(self.settings.delete_timeout, "delete", path, async {
            retry_with_backoff(
                || self.delete_attempt(path, verify_exists, cancel, operation_id),
                &policy,
                self.retry_predicate(operation_id, "delete"),
            )
            .await
        })
        .await
    }

    async fn delete_attempt(
        &self,
        path: &Path,
        verify_exists: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<(bool, u64, bool)> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if verify_exists {
                    return Err(FramegateError::FileNotFound(
                        path.to_string_lossy().into_owned(),
                    ));
                }
                return Ok((false, 0, false));
            }
            Err(e) => return Err(e.into()),
        };
        self.check_cancel(cancel, operation_id)?;

        let size = metadata.len();
        let offloaded = size > self.settings.large_delete_bytes;
        if offloaded {
            let target = path.to_path_buf();
            self.io_pool
                .execute(move || std::fs::remove_file(&target))
                .await??;
        } else {
            tokio::fs::remove_file(path).await?;
        }
        self.report(operation_id, 100.0, "deleted");
        Ok((true, size, offloaded))
    }

    /// List the files under `path` matching a glob pattern. The walk runs on
    /// the I/O thread pool; cancellation is honored between entries.
    pub async fn enumerate(
        &self,
        path: &Path,
        pattern: &str,
        recursive: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<EnumerateOutcome> {
        let started = Instant::now();
        let result = self
            .enumerate_inner(path, pattern, recursive, cancel, operation_id)
            .await;
        self.finish(operation_id, "enumerate", path, &result);
        let files = result?;
        Ok(EnumerateOutcome {
            operation_id: operation_id.to_string(),
            files,
            elapsed: started.elapsed(),
        })
    }

    async fn enumerate_inner(
        &self,
        path: &Path,
        pattern: &str,
        recursive: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<Vec<PathBuf>> {
        validate_path(path, PathRole::Directory)?;
        if !tokio::fs::try_exists(path).await? {
            return Err(FramegateError::FileNotFound(
                path.to_string_lossy().into_owned(),
            ));
        }
        self.tracker.register(operation_id, cancel.clone());
        let _permits = self.admit().await?;

        let matcher = glob_to_regex(pattern)?;
        let policy = RetryPolicy::from_settings(&self.retry, self.retry.bulk_max_attempts);
        self.with_timeout(self.settings.enumerate_timeout, "enumerate", path, async {
            retry_with_backoff(
                || {
                    self.enumerate_attempt(path, matcher.clone(), recursive, cancel, operation_id)
                },
                &policy,
                self.retry_predicate(operation_id, "enumerate"),
            )
            .await
        })
        .await
    }

    async fn enumerate_attempt(
        &self,
        path: &Path,
        matcher: Regex,
        recursive: bool,
        cancel: &CancellationToken,
        operation_id: &str,
    ) -> FramegateResult<Vec<PathBuf>> {
        let root = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let cancel = cancel.clone();
        let tracker = Arc::clone(&self.tracker);
        let alerts = self.alerts.clone();
        let op_id = operation_id.to_string();

        let files = self
            .io_pool
            .execute(move || -> FramegateResult<Vec<PathBuf>> {
                let mut walker = WalkDir::new(&root);
                if !recursive {
                    walker = walker.max_depth(1);
                }
                let mut files = Vec::new();
                let mut seen = 0usize;
                for entry in walker {
                    if cancel.is_cancelled() {
                        return Err(FramegateError::cancelled(&op_id));
                    }
                    let entry = entry.map_err(std::io::Error::other)?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    seen += 1;
                    if matcher.is_match(&entry.file_name().to_string_lossy()) {
                        files.push(entry.into_path());
                    }
                    if seen % 100 == 0 {
                        tracker.update(&op_id, 0.0, &format!("{} entries scanned", seen));
                        alerts.emit(
                            Alert::new(
                                AlertKind::FileOperationProgress,
                                format!("enumerate scanned {} entries", seen),
                            )
                            .with_context("operation_id", op_id.clone()),
                        );
                    }
                }
                Ok(files)
            })
            .await??;
        self.report(operation_id, 100.0, "enumerated");
        Ok(files)
    }

    /// Take a rollback point of `path` before a risky modification.
    pub async fn create_rollback_point(
        &self,
        path: &Path,
    ) -> FramegateResult<crate::fileio::rollback::RollbackPoint> {
        validate_path(path, PathRole::File)?;
        self.recovery.create_rollback_point(path).await
    }

    /// Number of file operations currently in flight or queued.
    pub fn active_operations(&self) -> usize {
        self.tracker.active_count()
    }

    /// Remove the temp directory. Best effort; stray artefacts under the
    /// platform temp root are harmless.
    pub async fn shutdown(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.temp_dir).await {
            log::debug!(
                "could not remove temp directory {}: {}",
                self.temp_dir.display(),
                e
            );
        }
    }

    async fn admit(&self) -> FramegateResult<(OwnedSemaphorePermit, OwnedSemaphorePermit)> {
        let queue_slot = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|_| FramegateError::initialization("file engine is shut down"))?;
        let permit = Arc::clone(&self.concurrency)
            .acquire_owned()
            .await
            .map_err(|_| FramegateError::initialization("file engine is shut down"))?;
        Ok((queue_slot, permit))
    }

    fn path_lock(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let key = absolute_key(path);
        let mut locks = self
            .path_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if locks.len() >= self.settings.path_lock_capacity {
            // Evict entries nobody holds; a held lock has clones outstanding.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(key).or_default())
    }

    fn check_cancel(&self, cancel: &CancellationToken, operation_id: &str) -> FramegateResult<()> {
        if cancel.is_cancelled() {
            Err(FramegateError::cancelled(operation_id))
        } else {
            Ok(())
        }
    }

    fn report(&self, operation_id: &str, percent: f64, status: &str) {
        self.tracker.update(operation_id, percent, status);
        self.alerts.emit(
            Alert::new(
                AlertKind::FileOperationProgress,
                format!("{} {:.0}%", status, percent),
            )
            .with_measurement(percent, 100.0)
            .with_context("operation_id", operation_id.to_string()),
        );
    }

    fn retry_predicate<'a>(
        &'a self,
        operation_id: &'a str,
        operation: &'a str,
    ) -> impl Fn(&FramegateError) -> bool + 'a {
        move |error| {
            let transient = error.is_transient();
            if transient {
                self.alerts.emit(
                    Alert::new(
                        AlertKind::AsyncFileOperationError,
                        format!("{} attempt failed, will retry: {}", operation, error),
                    )
                    .with_context("operation_id", operation_id.to_string()),
                );
            }
            transient
        }
    }

    async fn with_timeout<T>(
        &self,
        limit: Duration,
        operation: &str,
        path: &Path,
        work: impl std::future::Future<Output = FramegateResult<T>>,
    ) -> FramegateResult<T> {
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(FramegateError::timeout(
                format!("{} {}", operation, path.display()),
                limit,
            )),
        }
    }

    fn finish<T>(
        &self,
        operation_id: &str,
        operation: &str,
        path: &Path,
        result: &FramegateResult<T>,
    ) {
        self.tracker.complete(operation_id);
        match result {
            Ok(_) => {
                self.alerts.emit(
                    Alert::new(
                        AlertKind::AsyncFileOperationCompleted,
                        format!("{} completed: {}", operation, path.display()),
                    )
                    .with_context("operation_id", operation_id.to_string()),
                );
            }
            Err(e) => {
                self.alerts.emit(
                    Alert::new(
                        AlertKind::AsyncFileOperationFailed,
                        format!("{} failed: {}", operation, e),
                    )
                    .with_context("operation_id", operation_id.to_string())
                    .with_context("path", path.to_string_lossy().into_owned()),
                );
                if !e.is_cancelled() {
                    log::warn!("{} {} failed: {}", operation, path.display(), e);
                }
            }
        }
    }
}

fn absolute_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn glob_to_regex(pattern: &str) -> FramegateResult<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source)
        .map_err(|e| FramegateError::config(format!("invalid search pattern {:?}: {}", pattern, e)))
}
