// src/lock/instance.rs

//! At most one dispatch engine per host.
//!
//! A `main.pid` file under the day-local log directory carries an
//! exclusive OS file lock for the engine's process lifetime. A second
//! engine fails its lock attempt and exits with a clear diagnostic
//! before touching anything else.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::errors::{Result, RouterError};

const PID_FILE_NAME: &str = "main.pid";

/// Holds the instance lock until released or dropped.
#[derive(Debug)]
pub struct InstanceGuard {
    path: PathBuf,
    file: Option<File>,
}

impl InstanceGuard {
    /// Open (create if needed) `main.pid` under `log_dir` and take an
    /// exclusive lock on it.
    ///
    /// Fails with [`RouterError::InstanceAlreadyRunning`] when another
    /// engine holds the lock.
    pub fn acquire(log_dir: &Path) -> Result<Self> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("creating log directory {:?}", log_dir))?;

        let path = log_dir.join(PID_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("opening instance pid file {:?}", path))?;

        if file.try_lock_exclusive().is_err() {
            let holder = fs::read_to_string(&path).unwrap_or_default();
            return Err(RouterError::InstanceAlreadyRunning(format!(
                "pid file {} is locked (holder pid: {})",
                path.display(),
                holder.trim()
            )));
        }

        file.set_len(0)
            .with_context(|| format!("truncating instance pid file {:?}", path))?;
        write!(file, "{}", std::process::id())
            .with_context(|| format!("writing pid into {:?}", path))?;
        file.sync_all()
            .with_context(|| format!("syncing instance pid file {:?}", path))?;

        info!(path = %path.display(), pid = std::process::id(), "instance guard acquired");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Release the lock and delete the pid file on orderly shutdown.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
            drop(file);
            if let Err(err) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %err, "failed to delete instance pid file");
            } else {
                debug!(path = %self.path.display(), "instance guard released");
            }
        }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.release();
    }
}
