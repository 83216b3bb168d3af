use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use framegate::config::{FileEngineSettings, IsolationConfig, RetrySettings};
use framegate::core::{AlertSink, IoThreadPool};
use framegate::fileio::{AsyncFileEngine, ProgressTracker};

/// Initialize test logging once; respects `RUST_LOG`.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test workspace backed by a temporary directory.
#[allow(dead_code)]
pub struct TestWorkspace {
    pub temp_dir: TempDir,
}

impl TestWorkspace {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file with the given content under the workspace.
    #[allow(dead_code)]
    pub fn create_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Create `count` small text files under `subdir`.
    #[allow(dead_code)]
    pub fn create_tree(&self, subdir: &str, count: usize) -> PathBuf {
        let root = self.path().join(subdir);
        std::fs::create_dir_all(&root).unwrap();
        for i in 0..count {
            let bucket = root.join(format!("bucket_{}", i / 100));
            std::fs::create_dir_all(&bucket).unwrap();
            std::fs::write(bucket.join(format!("file_{:05}.txt", i)), b"x").unwrap();
        }
        root
    }
}

/// Manager configuration sized for tests: same policy values, small thread
/// pools.
#[allow(dead_code)]
pub fn test_config() -> IsolationConfig {
    let mut config = IsolationConfig::default();
    config.io_pool.manager_threads = 2;
    config.io_pool.worker_threads = 2;
    config.retry.initial_delay = Duration::from_millis(10);
    config
}

/// A stand-alone file engine with its own alert sink and small I/O pool.
#[allow(dead_code)]
pub fn test_engine() -> (Arc<AsyncFileEngine>, AlertSink) {
    let alerts = AlertSink::new(1024);
    let io_pool = Arc::new(
        IoThreadPool::new("test-io", 2, Duration::from_secs(1), alerts.clone()).unwrap(),
    );
    let engine = AsyncFileEngine::new(
        FileEngineSettings::default(),
        RetrySettings {
            initial_delay: Duration::from_millis(10),
            ..RetrySettings::default()
        },
        io_pool,
        Arc::new(ProgressTracker::new()),
        alerts.clone(),
    )
    .unwrap();
    (Arc::new(engine), alerts)
}
