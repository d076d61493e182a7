// src/watch/watcher.rs

//! Filesystem watcher and intake pipeline.
//!
//! A `notify` watcher observes the watch tree recursively. Its
//! synchronous callback forwards events into an unbounded channel; an
//! async consumer classifies each candidate path, waits for the file
//! to stabilise and enqueues a `Pending` job. The startup bootstrap
//! scan pushes pre-existing files through the same pipeline so no work
//! is lost across restarts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::engine::context::EngineContext;
use crate::hub::OutboundMessage;
use crate::queue::{AddOutcome, Job};
use crate::watch::classify::{classify, Classification};
use crate::watch::stability::{wait_until_stable, Stability, StabilityOptions};

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept
/// alive for as long as needed. Dropping this handle stops file
/// watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Start watching the configured tree and spawn the intake consumer.
pub fn spawn_watcher(ctx: Arc<EngineContext>) -> Result<WatcherHandle> {
    let root = ctx.settings.watch_directory.clone();

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // Can't use tracing from the notify thread reliably
                    // during shutdown; fall back to stderr.
                    eprintln!("filejobrouter: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("filejobrouter: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "file watcher started");

    // Consumer: classify and enqueue. Each candidate gets its own task
    // because the stability wait spans multiple sample intervals.
    let consumer_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = consumer_ctx.cancel.cancelled() => break,
                ev = event_rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };

            if !is_intake_event(&event.kind) {
                continue;
            }

            for path in event.paths {
                let task_ctx = Arc::clone(&consumer_ctx);
                tokio::spawn(async move {
                    process_candidate(task_ctx, path).await;
                });
            }
        }

        debug!("file watcher consumer loop ended");
    });

    Ok(WatcherHandle { _inner: watcher })
}

/// Only writes and creations start the intake pipeline; removals and
/// metadata churn are ignored.
fn is_intake_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Enumerate pre-existing files under the watch root and every mapped
/// subdirectory, pushing each through the normal intake pipeline.
/// Returns the number of candidates examined.
pub async fn bootstrap_scan(ctx: Arc<EngineContext>) -> usize {
    let root = &ctx.settings.watch_directory;
    let mut candidates: Vec<PathBuf> = Vec::new();

    // Files sitting directly in the watch root.
    match std::fs::read_dir(root) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    candidates.push(path);
                }
            }
        }
        Err(err) => {
            warn!(root = %root.display(), error = %err, "bootstrap: cannot read watch root");
            return 0;
        }
    }

    // Everything below each mapped subdirectory.
    for key in ctx.settings.mappings.keys() {
        let dir = root.join(key);
        if dir.is_dir() {
            collect_files(&dir, &mut candidates);
        }
    }

    let count = candidates.len();
    if count > 0 {
        info!(count, "bootstrap: found pre-existing files to classify");
    }

    for path in candidates {
        let task_ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            process_candidate(task_ctx, path).await;
        });
    }

    count
}

/// Stack-based recursive walk collecting plain files.
fn collect_files(root: &Path, out: &mut Vec<PathBuf>) {
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "bootstrap: cannot read directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                out.push(path);
            }
        }
    }
}

/// Classify, debounce and enqueue one candidate file.
async fn process_candidate(ctx: Arc<EngineContext>, path: PathBuf) {
    if !path.is_file() {
        return;
    }

    let (target_app, output_path) = match classify(&ctx.settings, &ctx.day, &path) {
        Classification::Route {
            target_app,
            output_path,
        } => (target_app, output_path),
        Classification::Skip(reason) => {
            info!(path = %path.display(), %reason, "skipping file");
            return;
        }
    };

    match wait_until_stable(&path, StabilityOptions::default()).await {
        Stability::Stable => {}
        Stability::Vanished => {
            debug!(path = %path.display(), "file vanished before stabilising");
            return;
        }
        Stability::NeverSettled => {
            warn!(path = %path.display(), "file never stabilised; skipping");
            return;
        }
    }

    let job = Job::new(path.clone(), output_path, target_app.as_str(), ctx.user.as_str());
    let job_id = job.id.clone();

    match ctx.store.add(job.clone()).await {
        Ok(AddOutcome::Added) => {
            info!(
                job_id = %job_id,
                input = %path.display(),
                target = %target_app,
                "job enqueued"
            );
            ctx.records.write(&job);

            let jobs = ctx.store.load().await;
            match serde_json::to_value(&jobs) {
                Ok(payload) => ctx.hub.send(OutboundMessage::queue_update(payload)),
                Err(err) => warn!(error = %err, "failed to serialize queue payload"),
            }
        }
        Ok(AddOutcome::DuplicateActive) => {
            debug!(input = %path.display(), "duplicate intake dropped (active job exists)");
        }
        Err(err) => {
            warn!(input = %path.display(), error = %err, "failed to enqueue job");
        }
    }
}
