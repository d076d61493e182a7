// src/queue/store.rs

//! Durable, day-partitioned persistence of the job list.
//!
//! The queue for a day is a single JSON array at
//! `<base>/<yyyy-MM-dd>/queue.json`. Every save goes through an
//! exclusively-created sibling temp file, fsync and rename, so the file
//! is valid JSON at every observable instant. Writers inside the engine
//! serialise through an in-process mutex; an advisory `queue.lock` file
//! additionally guards against writers in other processes (the instance
//! guard is what actually enforces a single writer).

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use fs2::FileExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{Result, RouterError};
use crate::paths;
use crate::queue::job::{Job, JobStatus};

/// Bounded wait for the cross-process advisory lock.
const ADVISORY_LOCK_WAIT: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the advisory lock.
const ADVISORY_POLL: Duration = Duration::from_millis(50);

/// Diagnostic set on jobs rescued from an unclean shutdown.
const RECOVERY_MESSAGE: &str = "Recovered from previous session";

/// Result of [`QueueStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// An active (`Pending` or `Processing`) job already exists for the
    /// same input path; the new job was dropped.
    DuplicateActive,
}

/// Store for one day's queue file.
#[derive(Debug)]
pub struct QueueStore {
    queue_file: PathBuf,
    lock_file: PathBuf,
    mutex: Mutex<()>,
}

impl QueueStore {
    /// Create a store bound to the day partition computed at engine
    /// startup. The directory is created on first save.
    pub fn new(queue_base: impl AsRef<Path>, day: &str) -> Self {
        let queue_file = paths::day_queue_file(queue_base.as_ref(), day);
        let lock_file = queue_file.with_file_name("queue.lock");
        Self {
            queue_file,
            lock_file,
            mutex: Mutex::new(()),
        }
    }

    pub fn queue_file(&self) -> &Path {
        &self.queue_file
    }

    /// Return the current day's queue, empty if the file is absent.
    ///
    /// Unreadable or unparsable queue files are logged and treated as
    /// empty so intake and dispatch can continue.
    pub async fn load(&self) -> Vec<Job> {
        let _guard = self.mutex.lock().await;
        let _advisory = self.advisory_lock().await;
        self.read_jobs()
    }

    /// Persist the full job list atomically.
    pub async fn save(&self, jobs: &[Job]) -> Result<()> {
        let _guard = self.mutex.lock().await;
        let _advisory = self.advisory_lock().await;
        self.write_jobs(jobs)
    }

    /// Append a job unless an active job for the same input path
    /// already exists.
    pub async fn add(&self, job: Job) -> Result<AddOutcome> {
        let _guard = self.mutex.lock().await;
        let _advisory = self.advisory_lock().await;

        let mut jobs = self.read_jobs();
        let duplicate = jobs
            .iter()
            .any(|j| j.is_active() && j.input_path == job.input_path);
        if duplicate {
            debug!(input = %job.input_path.display(), "active job already queued; dropping duplicate");
            return Ok(AddOutcome::DuplicateActive);
        }

        jobs.push(job);
        self.write_jobs(&jobs)?;
        Ok(AddOutcome::Added)
    }

    /// Replace the stored job with the same id.
    pub async fn update(&self, job: &Job) -> Result<()> {
        let _guard = self.mutex.lock().await;
        let _advisory = self.advisory_lock().await;

        let mut jobs = self.read_jobs();
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(slot) => *slot = job.clone(),
            None => return Err(RouterError::JobNotFound(job.id.clone())),
        }
        self.write_jobs(&jobs)
    }

    /// The oldest `Pending` job by creation time, if any.
    pub async fn next_pending(&self) -> Option<Job> {
        self.load()
            .await
            .into_iter()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by_key(|j| j.created_at)
    }

    /// Startup recovery: any job left in `Processing` by an unclean
    /// shutdown goes back to `Pending` with its execution window
    /// cleared. Returns the number of rescued jobs. Idempotent.
    pub async fn recover(&self) -> Result<usize> {
        let _guard = self.mutex.lock().await;
        let _advisory = self.advisory_lock().await;

        let mut jobs = self.read_jobs();
        let mut rescued = 0;
        for job in jobs.iter_mut() {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Pending;
                job.started_at = None;
                job.error_message = Some(RECOVERY_MESSAGE.to_string());
                rescued += 1;
            }
        }

        if rescued > 0 {
            self.write_jobs(&jobs)?;
        }
        Ok(rescued)
    }

    // ── file I/O (callers hold both locks) ──────────────────────────

    fn read_jobs(&self) -> Vec<Job> {
        let contents = match fs::read_to_string(&self.queue_file) {
            Ok(c) => c,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %self.queue_file.display(), error = %err, "failed to read queue file; treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Job>>(&contents) {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(path = %self.queue_file.display(), error = %err, "failed to parse queue file; treating as empty");
                Vec::new()
            }
        }
    }

    fn write_jobs(&self, jobs: &[Job]) -> Result<()> {
        let dir = self
            .queue_file
            .parent()
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("creating queue directory {:?}", dir))?;

        let payload = serde_json::to_vec_pretty(jobs)?;
        let tmp = dir.join(format!(".queue.{}.tmp", Uuid::new_v4().simple()));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .with_context(|| format!("creating queue temp file {:?}", tmp))?;
        file.write_all(&payload)
            .with_context(|| format!("writing queue temp file {:?}", tmp))?;
        file.sync_all()
            .with_context(|| format!("syncing queue temp file {:?}", tmp))?;
        drop(file);

        if let Err(rename_err) = fs::rename(&tmp, &self.queue_file) {
            // Rename-or-replace can fail across mounts or on exotic
            // targets; fall back to copy-over-and-delete-temp.
            debug!(error = %rename_err, "rename failed; falling back to copy");
            fs::copy(&tmp, &self.queue_file)
                .with_context(|| format!("copying queue temp into {:?}", self.queue_file))?;
            let _ = fs::remove_file(&tmp);
        }

        Ok(())
    }

    /// Take the cross-process advisory lock with a bounded wait.
    ///
    /// Timing out logs a warning and proceeds without it; the instance
    /// guard is what enforces the at-most-one-writer invariant.
    async fn advisory_lock(&self) -> Option<AdvisoryGuard> {
        if let Some(dir) = self.lock_file.parent() {
            if let Err(err) = fs::create_dir_all(dir) {
                warn!(error = %err, "failed to create queue directory for advisory lock");
                return None;
            }
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_file)
        {
            Ok(f) => f,
            Err(err) => {
                warn!(path = %self.lock_file.display(), error = %err, "failed to open queue.lock; proceeding without advisory lock");
                return None;
            }
        };

        let deadline = Instant::now() + ADVISORY_LOCK_WAIT;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Some(AdvisoryGuard { file }),
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(ADVISORY_POLL).await;
                }
                Err(err) => {
                    warn!(path = %self.lock_file.display(), error = %err, "timed out waiting for queue.lock; proceeding without advisory lock");
                    return None;
                }
            }
        }
    }
}

/// Holds the advisory flock until dropped.
struct AdvisoryGuard {
    file: File,
}

impl Drop for AdvisoryGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
