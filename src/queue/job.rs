// src/queue/job.rs

//! The persistent job record and its status lifecycle.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel `target_app` for files dropped into the watch root before a
/// worker has been resolved.
pub const USER_CHOICE: &str = "user_choice";

/// Lifecycle state of a job.
///
/// Transitions are monotonic along
/// `Pending -> Processing -> {Completed, Failed, Timeout}`, plus
/// `{Failed, Timeout} -> Pending` on retry and `Processing -> Pending`
/// on recovery from an unclean shutdown.
///
/// In `queue.json` the status is stored as the integer ordinal
/// (`0=Pending .. 4=Timeout`) to match readers already in the field;
/// job-side records use the string name instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
}

impl JobStatus {
    pub fn as_ordinal(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed => 2,
            JobStatus::Failed => 3,
            JobStatus::Timeout => 4,
        }
    }

    pub fn from_ordinal(n: u64) -> Option<Self> {
        match n {
            0 => Some(JobStatus::Pending),
            1 => Some(JobStatus::Processing),
            2 => Some(JobStatus::Completed),
            3 => Some(JobStatus::Failed),
            4 => Some(JobStatus::Timeout),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Processing => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Timeout => "Timeout",
        }
    }

    /// Active statuses are the ones duplicate suppression counts: a new
    /// job for the same input path is dropped while one of these exists.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_ordinal())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = u64::deserialize(deserializer)?;
        JobStatus::from_ordinal(n)
            .ok_or_else(|| de::Error::custom(format!("invalid job status ordinal {n}")))
    }
}

/// A persistent job record.
///
/// Created by the watcher, mutated exclusively by the processor, never
/// destroyed in normal operation; jobs age out with the day partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    /// Globally unique opaque id, assigned on creation.
    pub id: String,

    /// Absolute path to the source file.
    pub input_path: PathBuf,

    /// Absolute path where the worker's result must land. Empty at
    /// creation when the target worker is not yet resolved.
    #[serde(default)]
    pub output_path: PathBuf,

    /// Key identifying which worker handles the job; may be the
    /// sentinel [`USER_CHOICE`] during intake of root files.
    pub target_app: String,

    pub status: JobStatus,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub retry_count: u32,

    /// Free-form diagnostic for the last failure.
    #[serde(default)]
    pub error_message: Option<String>,

    /// The OS user under which intake occurred.
    #[serde(default)]
    pub user_name: String,
}

impl Job {
    /// Create a fresh `Pending` job for a newly stable input file.
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        target_app: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input_path: input_path.into(),
            output_path: output_path.into(),
            target_app: target_app.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            error_message: None,
            user_name: user_name.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Reset the job to `Pending` for another attempt, clearing the
    /// execution window and any previous diagnostic.
    pub fn reset_for_retry(&mut self) {
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error_message = None;
    }
}
