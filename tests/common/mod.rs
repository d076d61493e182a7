#![allow(dead_code)]

use std::error::Error;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use filejobrouter::config::model::{Settings, WorkerMapping};
use filejobrouter::engine::EngineContext;
use filejobrouter::hub::{HubHandle, OutboundMessage};
use filejobrouter::paths;
use filejobrouter::queue::record::RecordWriter;
use filejobrouter::queue::{Job, QueueStore};

pub type TestResult = Result<(), Box<dyn Error>>;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing**
///   tests (unless you run with `-- --nocapture`).
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Wrap a test body in a hard timeout so a wedged loop fails instead of
/// hanging the suite.
pub async fn with_timeout<F>(fut: F) -> TestResult
where
    F: Future<Output = TestResult>,
{
    match tokio::time::timeout(Duration::from_secs(60), fut).await {
        Ok(result) => result,
        Err(_) => Err("test timed out".into()),
    }
}

/// Settings rooted in a scratch directory with a single worker mapping.
pub fn settings_with_mapping(root: &Path, key: &str, executable: &str) -> Settings {
    let mut mappings = std::collections::BTreeMap::new();
    mappings.insert(
        key.to_string(),
        WorkerMapping {
            executable_path: executable.to_string(),
            output_directory: root.join("out").join(key),
        },
    );

    Settings {
        watch_directory: root.join("watch"),
        timeout_seconds: 30,
        max_retry_count: 1,
        log_directory: root.join("logs"),
        jobs_directory: root.join("jobs"),
        queue_base_directory: root.join("queue"),
        mutex_name: format!("fjr-test-{}", uuid::Uuid::new_v4().simple()),
        mappings,
        ignore_hidden_and_system_files: true,
        default_worker_for_root: None,
        runtime_launcher: "dotnet".to_string(),
    }
}

/// Build an engine context over the given settings, with the hub
/// replaced by a plain channel so tests can observe emitted events.
pub fn engine_context(
    settings: Settings,
    root: &Path,
) -> (Arc<EngineContext>, mpsc::Receiver<OutboundMessage>) {
    let day = paths::startup_day();
    let user = "tester".to_string();
    let store = QueueStore::new(&settings.queue_base_directory, &day);
    let records = RecordWriter::new(paths::day_jobs_dir(&settings.jobs_directory, &user, &day));
    let (hub, hub_rx) = HubHandle::channel(1024);

    let ctx = Arc::new(EngineContext {
        settings,
        config_path: root.join("config.json"),
        day,
        user,
        store,
        records,
        hub,
        cancel: CancellationToken::new(),
    });

    (ctx, hub_rx)
}

/// Write an executable `sh` script and return its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir).expect("create script dir");
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");

    let mut perms = std::fs::metadata(&path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");

    path
}

/// Poll the store until the predicate holds, returning the matching
/// snapshot, or `None` on timeout.
pub async fn wait_for_jobs<F>(store: &QueueStore, timeout: Duration, pred: F) -> Option<Vec<Job>>
where
    F: Fn(&[Job]) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let jobs = store.load().await;
        if pred(&jobs) {
            return Some(jobs);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
