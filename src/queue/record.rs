// src/queue/record.rs

//! Per-job side records: one JSON object per job under
//! `jobs/<user>/<yyyy-MM-dd>/<id>.json`, rewritten on every state
//! change. Writes are best-effort; a failed record never fails the job.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::queue::job::Job;

/// The on-disk shape of a side record. Unlike `queue.json`, `Status`
/// here is the string name.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct JobRecord<'a> {
    id: &'a str,
    input_path: &'a Path,
    target_app: &'a str,
    status: &'static str,
    timestamp: DateTime<Utc>,
    error_message: Option<&'a str>,
    username: &'a str,
}

/// Writes side records into a fixed day directory.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    dir: PathBuf,
}

impl RecordWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write (or overwrite) the record for `job`. Logs at warn on
    /// failure instead of propagating.
    pub fn write(&self, job: &Job) {
        if let Err(err) = self.try_write(job) {
            warn!(job_id = %job.id, error = %err, "failed to write job side record");
        }
    }

    fn try_write(&self, job: &Job) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating job record dir {:?}", self.dir))?;

        let record = JobRecord {
            id: &job.id,
            input_path: &job.input_path,
            target_app: &job.target_app,
            status: job.status.as_str(),
            timestamp: Utc::now(),
            error_message: job.error_message.as_deref(),
            username: &job.user_name,
        };

        let path = self.dir.join(format!("{}.json", job.id));
        let payload = serde_json::to_string_pretty(&record)
            .context("serializing job side record")?;
        fs::write(&path, payload)
            .with_context(|| format!("writing job side record {:?}", path))?;
        Ok(())
    }
}
