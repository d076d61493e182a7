// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration as read from `config.json`.
///
/// Field names on disk are PascalCase, matching readers already in the
/// field:
///
/// ```json
/// {
///   "WatchDirectory": "/srv/inbox",
///   "TimeoutSeconds": 120,
///   "MaxRetryCount": 2,
///   "Mappings": {
///     "abc": { "ExecutablePath": "workers/abc", "OutputDirectory": "out/abc" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    /// Root directory observed by the watcher.
    pub watch_directory: PathBuf,

    /// Per-job wall-clock timeout for the worker subprocess, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Cap on timeout-driven automatic retries.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,

    /// Base for `logs/<user>/<yyyy-MM-dd>/...`.
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,

    /// Base for `jobs/<user>/<yyyy-MM-dd>/<job-id>.json` side records.
    #[serde(default = "default_jobs_directory")]
    pub jobs_directory: PathBuf,

    /// Base for `queue/<yyyy-MM-dd>/queue.json`.
    #[serde(default = "default_queue_base_directory")]
    pub queue_base_directory: PathBuf,

    /// Symbolic name the device lock filename is derived from.
    #[serde(default = "default_mutex_name")]
    pub mutex_name: String,

    /// Worker-key -> executable + output root.
    ///
    /// Keys are the first-level subdirectory names of the watch tree.
    #[serde(default)]
    pub mappings: BTreeMap<String, WorkerMapping>,

    /// Skip dotfiles and `Thumbs.db` during intake.
    #[serde(default = "default_true")]
    pub ignore_hidden_and_system_files: bool,

    /// Optional worker-key used for files dropped in the watch root.
    #[serde(default)]
    pub default_worker_for_root: Option<String>,

    /// Command used to invoke `.dll` workers when no native executable
    /// exists next to the configured path.
    #[serde(default = "default_runtime_launcher")]
    pub runtime_launcher: String,
}

/// A configuration entry for one worker executable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerMapping {
    /// Path to the worker binary. `{username}`, `{day}` and OS
    /// environment variables are expanded before resolution.
    pub executable_path: String,

    /// Output root for this worker. The produced output path inserts
    /// the day partition before this directory's final component.
    pub output_directory: PathBuf,
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_max_retry_count() -> u32 {
    3
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_jobs_directory() -> PathBuf {
    PathBuf::from("jobs")
}

fn default_queue_base_directory() -> PathBuf {
    PathBuf::from("queue")
}

fn default_mutex_name() -> String {
    "filejobrouter-device".to_string()
}

fn default_runtime_launcher() -> String {
    "dotnet".to_string()
}

fn default_true() -> bool {
    true
}

/// The subset of settings the processor rereads while running.
///
/// Only these two fields may change live; everything else is fixed for
/// the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    pub timeout_seconds: u64,
    pub max_retry_count: u32,
}

impl Settings {
    pub fn tunables(&self) -> Tunables {
        Tunables {
            timeout_seconds: self.timeout_seconds,
            max_retry_count: self.max_retry_count,
        }
    }
}
