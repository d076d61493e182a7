// src/engine/processor.rs

//! The dispatch loop: the single writer of the job queue.
//!
//! One long-running task picks the oldest pending job, serialises the
//! execution window behind the device lock, runs the worker subprocess
//! with a timeout, records the outcome and applies the retry policy.
//! Dashboard-initiated retries funnel through the same task, so every
//! queue mutation after intake happens here.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::loader;
use crate::config::model::Tunables;
use crate::engine::context::EngineContext;
use crate::errors::Result;
use crate::exec::{resolve_binary, run_worker, WorkerOutcome};
use crate::hub::OutboundMessage;
use crate::lock::DeviceLock;
use crate::paths;
use crate::queue::{Job, JobStatus, USER_CHOICE};
use crate::watch::classify::output_path_for;

/// Budget for one device acquisition attempt.
const DEVICE_ACQUIRE_WAIT: Duration = Duration::from_secs(5);

/// Sleep between queue polls when nothing is pending.
const IDLE_SLEEP: Duration = Duration::from_secs(5);

/// Minimum wall-clock gap between tunable rereads.
const TUNABLE_RELOAD_INTERVAL: Duration = Duration::from_secs(2);

pub struct Processor {
    ctx: std::sync::Arc<EngineContext>,
    device: DeviceLock,
    retry_rx: mpsc::Receiver<String>,
    tunables: Tunables,
    last_tunable_check: Instant,
}

impl Processor {
    pub fn new(
        ctx: std::sync::Arc<EngineContext>,
        device: DeviceLock,
        retry_rx: mpsc::Receiver<String>,
    ) -> Self {
        let tunables = ctx.settings.tunables();
        Self {
            ctx,
            device,
            retry_rx,
            tunables,
            last_tunable_check: Instant::now(),
        }
    }

    /// Run until the engine is cancelled.
    pub async fn run(mut self) -> Result<()> {
        info!("processor started");

        match self.ctx.store.recover().await {
            Ok(0) => {}
            Ok(rescued) => {
                info!(rescued, "recovered in-flight jobs from previous session");
                self.emit_queue_snapshot().await;
            }
            Err(err) => warn!(error = %err, "queue recovery failed; continuing"),
        }

        loop {
            if self.ctx.cancel.is_cancelled() {
                break;
            }

            self.drain_retry_commands().await;

            match self.ctx.store.next_pending().await {
                Some(job) => self.dispatch(job).await,
                None => self.idle_wait().await,
            }
        }

        info!("processor exiting");
        Ok(())
    }

    // ── per-job dispatch ────────────────────────────────────────────

    async fn dispatch(&mut self, mut job: Job) {
        debug!(job_id = %job.id, input = %job.input_path.display(), "dispatching job");

        if let Err(msg) = self.resolve_target(&mut job) {
            self.fail_job(&mut job, msg).await;
            return;
        }

        if !self.device.try_acquire(DEVICE_ACQUIRE_WAIT).await {
            debug!(job_id = %job.id, "device busy; job stays pending");
            self.ctx.hub.send(OutboundMessage::job_update(
                &job.id,
                job.status.as_str(),
                "waiting for device",
            ));
            return;
        }

        self.run_attempt(&mut job).await;
        self.device.release();
    }

    /// Resolve the sentinel target and make sure an output path exists.
    fn resolve_target(&self, job: &mut Job) -> std::result::Result<(), String> {
        if job.target_app == USER_CHOICE {
            let default = self
                .ctx
                .settings
                .default_worker_for_root
                .as_deref()
                .ok_or_else(|| {
                    "no DefaultWorkerForRoot configured for a watch-root file".to_string()
                })?;
            if !self.ctx.settings.mappings.contains_key(default) {
                return Err(format!(
                    "DefaultWorkerForRoot '{default}' has no entry in Mappings"
                ));
            }
            job.target_app = default.to_string();
        }

        let mapping = self
            .ctx
            .settings
            .mappings
            .get(&job.target_app)
            .ok_or_else(|| format!("no worker mapping for '{}'", job.target_app))?;

        if job.output_path.as_os_str().is_empty() {
            let below_key = self.input_subpath_below_key(&job.input_path);
            job.output_path = output_path_for(&mapping.output_directory, &self.ctx.day, &below_key);
        }

        Ok(())
    }

    /// The input's path below its first-level directory, or just the
    /// file name for watch-root files.
    fn input_subpath_below_key(&self, input: &Path) -> PathBuf {
        let rel = match input.strip_prefix(&self.ctx.settings.watch_directory) {
            Ok(r) => r,
            Err(_) => return input.file_name().map(PathBuf::from).unwrap_or_default(),
        };

        let components: Vec<_> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s),
                _ => None,
            })
            .collect();

        if components.len() >= 2 {
            components[1..].iter().collect()
        } else {
            rel.file_name().map(PathBuf::from).unwrap_or_default()
        }
    }

    /// One execution window: the device is held for the whole of this
    /// function and released by the caller.
    async fn run_attempt(&mut self, job: &mut Job) {
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        self.persist_and_emit(job, "processing started").await;

        self.maybe_reload_tunables();

        let Some(mapping) = self.ctx.settings.mappings.get(&job.target_app).cloned() else {
            // resolve_target checked this; mappings are immutable.
            self.fail_job(job, format!("no worker mapping for '{}'", job.target_app))
                .await;
            return;
        };

        let base = self.worker_base_path(&job.target_app, &mapping.executable_path);
        let binary = match resolve_binary(Path::new(&base), &self.ctx.settings.runtime_launcher) {
            Ok(b) => b,
            Err(attempted) => {
                let list = attempted
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.fail_job(job, format!("Worker binary not found; attempted: {list}"))
                    .await;
                return;
            }
        };

        if let Some(parent) = job.output_path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(dir = %parent.display(), error = %err, "failed to create output directory");
            }
        }

        let timeout = Duration::from_secs(self.tunables.timeout_seconds);
        let outcome = run_worker(
            &binary,
            &job.input_path,
            &job.output_path,
            timeout,
            &self.ctx.cancel,
        )
        .await;

        match outcome {
            Err(err) => {
                self.fail_job(job, format!("Failed to start worker: {err:#}"))
                    .await;
            }
            Ok(WorkerOutcome::Exited { code: 0, .. }) => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(Utc::now());
                job.error_message = None;
                self.persist_and_emit(job, "completed").await;
                self.delete_input(job);
            }
            Ok(WorkerOutcome::Exited { code, stderr }) => {
                let message = if stderr.trim().is_empty() {
                    format!("Worker process exited with code {code}")
                } else {
                    format!("Worker stderr: {}", stderr.trim())
                };
                job.retry_count += 1;
                self.fail_job(job, message).await;
            }
            Ok(WorkerOutcome::TimedOut) => {
                self.apply_timeout_retry(job).await;
            }
            Ok(WorkerOutcome::Cancelled) => {
                self.fail_job(job, "Cancelled".to_string()).await;
            }
        }
    }

    /// Timeout retry policy: requeue while the retry cap allows,
    /// otherwise fail for good.
    async fn apply_timeout_retry(&mut self, job: &mut Job) {
        job.retry_count += 1;
        job.status = JobStatus::Timeout;
        job.error_message = Some("Process timed out".to_string());
        self.persist_and_emit(job, "Process timed out").await;

        if job.retry_count <= self.tunables.max_retry_count {
            job.reset_for_retry();
            let message = format!(
                "requeued after timeout (attempt {} of {})",
                job.retry_count, self.tunables.max_retry_count
            );
            info!(job_id = %job.id, %message, "timeout retry");
            self.persist_and_emit(job, &message).await;
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            warn!(
                job_id = %job.id,
                retry_count = job.retry_count,
                "timeout retry cap exceeded; failing job"
            );
            self.persist_and_emit(job, "Process timed out").await;
        }
    }

    /// Post-success cleanup of the input file; a failure here never
    /// changes the job's state.
    fn delete_input(&self, job: &Job) {
        if let Err(err) = std::fs::remove_file(&job.input_path) {
            warn!(
                input = %job.input_path.display(),
                error = %err,
                "failed to delete input file after completion"
            );
        } else {
            debug!(input = %job.input_path.display(), "input file deleted");
        }
    }

    /// Worker binary base path: environment override first, then the
    /// configured path with tokens expanded.
    fn worker_base_path(&self, key: &str, configured: &str) -> String {
        let env_name = format!("FILEJOBROUTER_WORKER_{}", key.to_uppercase());
        if let Ok(value) = std::env::var(&env_name) {
            if !value.trim().is_empty() {
                debug!(%env_name, "using environment override for worker binary");
                return value;
            }
        }
        paths::expand_tokens(configured, &self.ctx.user, &self.ctx.day)
    }

    /// Reread `TimeoutSeconds` / `MaxRetryCount` from the config file,
    /// rate-limited to once per [`TUNABLE_RELOAD_INTERVAL`]. Never
    /// mutates other settings live.
    fn maybe_reload_tunables(&mut self) {
        if self.last_tunable_check.elapsed() < TUNABLE_RELOAD_INTERVAL {
            return;
        }
        self.last_tunable_check = Instant::now();

        match loader::load_from_path(&self.ctx.config_path) {
            Ok(fresh) => {
                let new = fresh.tunables();
                if new != self.tunables {
                    info!(
                        timeout_seconds = new.timeout_seconds,
                        max_retry_count = new.max_retry_count,
                        "tunables changed on disk; adopting"
                    );
                    self.tunables = new;
                }
            }
            Err(err) => {
                debug!(error = %err, "tunable reload failed; keeping current values");
            }
        }
    }

    // ── dashboard-initiated retry ───────────────────────────────────

    async fn drain_retry_commands(&mut self) {
        while let Ok(job_id) = self.retry_rx.try_recv() {
            self.handle_retry_command(&job_id).await;
        }
    }

    async fn idle_wait(&mut self) {
        tokio::select! {
            _ = self.ctx.cancel.cancelled() => {}
            cmd = self.retry_rx.recv() => {
                match cmd {
                    Some(job_id) => self.handle_retry_command(&job_id).await,
                    // Command channel gone; fall back to plain pacing.
                    None => tokio::time::sleep(IDLE_SLEEP).await,
                }
            }
            _ = tokio::time::sleep(IDLE_SLEEP) => {}
        }
    }

    /// Requeue a failed job on behalf of the dashboard. A retry for a
    /// job that is not `Failed` is a no-op.
    async fn handle_retry_command(&mut self, job_id: &str) {
        let jobs = self.ctx.store.load().await;
        let Some(mut job) = jobs.into_iter().find(|j| j.id == job_id) else {
            warn!(%job_id, "retry command for unknown job");
            return;
        };

        if job.status != JobStatus::Failed {
            debug!(
                %job_id,
                status = %job.status,
                "retry command ignored; job is not failed"
            );
            return;
        }

        if !job.input_path.exists() {
            job.error_message = Some("Input file not found".to_string());
            job.completed_at = Some(Utc::now());
            self.persist_and_emit(&job, "Input file not found").await;
            return;
        }

        job.reset_for_retry();
        job.retry_count += 1;
        info!(%job_id, retry_count = job.retry_count, "job requeued by dashboard");
        self.persist_and_emit(&job, "requeued by dashboard").await;
    }

    // ── persistence + events ────────────────────────────────────────

    /// Fail the job with a diagnostic. Used for both per-job errors and
    /// worker failures; never propagates.
    async fn fail_job(&mut self, job: &mut Job, message: String) {
        warn!(job_id = %job.id, %message, "job failed");
        job.status = JobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error_message = Some(message.clone());
        self.persist_and_emit(job, &message).await;
    }

    /// Persist the job, then emit the matching hub events. The write
    /// always lands before the events so the dashboard can never
    /// observe a state that is not durable. Queue I/O failures are
    /// logged and the loop continues.
    async fn persist_and_emit(&self, job: &Job, message: &str) {
        if let Err(err) = self.ctx.store.update(job).await {
            warn!(job_id = %job.id, error = %err, "failed to persist job update");
            return;
        }
        self.ctx.records.write(job);

        self.ctx.hub.send(OutboundMessage::job_update(
            &job.id,
            job.status.as_str(),
            message,
        ));
        self.emit_queue_snapshot().await;
    }

    async fn emit_queue_snapshot(&self) {
        let jobs = self.ctx.store.load().await;
        match serde_json::to_value(&jobs) {
            Ok(payload) => self.ctx.hub.send(OutboundMessage::queue_update(payload)),
            Err(err) => warn!(error = %err, "failed to serialize queue payload"),
        }
    }
}
