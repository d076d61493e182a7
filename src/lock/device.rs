// src/lock/device.rs

//! Cross-process, cross-user mutual exclusion for the shared device.
//!
//! The lock is an advisory lock file in a machine-global directory
//! (`FILEJOBROUTER_LOCK_DIR` overrides it). Ownership combines
//! exclusive-creation semantics with an OS file lock held for the
//! lifetime of the handle; the file carries a JSON owner record so a
//! contender can reclaim the lock when the recorded PID is gone.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Poll interval between acquisition attempts.
const ACQUIRE_POLL: Duration = Duration::from_millis(250);

/// Environment variable overriding the lock directory.
pub const LOCK_DIR_ENV: &str = "FILEJOBROUTER_LOCK_DIR";

/// Owner record stored inside the lock file.
#[derive(Debug, Serialize, Deserialize)]
struct OwnerRecord {
    pid: u32,
    user: String,
    timestamp: DateTime<Utc>,
}

/// Handle to the device lock. At most one process on the host holds it
/// at a time; it is held only inside a single job's execution window.
#[derive(Debug)]
pub struct DeviceLock {
    path: PathBuf,
    handle: Option<File>,
}

impl DeviceLock {
    /// Derive the lock file location from the configured mutex name.
    pub fn new(mutex_name: &str) -> Self {
        let dir = std::env::var_os(LOCK_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let file_name = format!("{}.lock", sanitize(mutex_name));
        Self {
            path: dir.join(file_name),
            handle: None,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.handle.is_some()
    }

    /// Try to acquire the device within `timeout`. Returns `false` when
    /// the deadline passes with the device still owned elsewhere.
    pub async fn try_acquire(&mut self, timeout: Duration) -> bool {
        if self.handle.is_some() {
            return true;
        }

        if let Some(dir) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), error = %err, "failed to create device lock directory");
                return false;
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.try_create_and_own() {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "device lock attempt failed");
                }
            }

            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(ACQUIRE_POLL).await;
        }
    }

    /// One acquisition attempt: exclusive-create, or reclaim a stale
    /// owner. `Ok(false)` means a live owner holds the device.
    fn try_create_and_own(&mut self) -> std::io::Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                if let Err(err) = file.try_lock_exclusive() {
                    // We created the file but cannot lock it; give up on
                    // this attempt and let the next one start clean.
                    warn!(error = %err, "created device lock file but could not flock it");
                    let _ = fs::remove_file(&self.path);
                    return Ok(false);
                }

                let record = OwnerRecord {
                    pid: std::process::id(),
                    user: crate::paths::current_user(),
                    timestamp: Utc::now(),
                };
                let payload = serde_json::to_vec(&record).unwrap_or_default();
                file.write_all(&payload)?;
                file.sync_all()?;

                info!(path = %self.path.display(), "device lock acquired");
                self.handle = Some(file);
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                if self.reclaim_if_stale() {
                    // Retry on the next poll; the file is gone now.
                    debug!(path = %self.path.display(), "reclaimed stale device lock");
                }
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Inspect the existing lock file; unlink it when the recorded
    /// owner PID no longer exists on this host.
    fn reclaim_if_stale(&self) -> bool {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            // Racing owner released between our create attempt and now.
            Err(_) => return false,
        };

        let record: OwnerRecord = match serde_json::from_str(&contents) {
            Ok(r) => r,
            Err(err) => {
                // An unreadable owner record counts as stale; a live
                // owner rewrites it on its next acquisition.
                warn!(path = %self.path.display(), error = %err, "unparsable device lock owner record; reclaiming");
                return fs::remove_file(&self.path).is_ok();
            }
        };

        if pid_alive(record.pid) {
            return false;
        }

        info!(
            path = %self.path.display(),
            stale_pid = record.pid,
            stale_user = %record.user,
            "device lock owner no longer exists; reclaiming"
        );
        fs::remove_file(&self.path).is_ok()
    }

    /// Best-effort release: close the handle and unlink the file. A
    /// failed unlink is left for the next acquirer's stale-owner
    /// reclamation.
    pub fn release(&mut self) {
        if let Some(file) = self.handle.take() {
            let _ = FileExt::unlock(&file);
            drop(file);
            if let Err(err) = fs::remove_file(&self.path) {
                if err.kind() != ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %err, "failed to unlink device lock file on release");
                }
            } else {
                debug!(path = %self.path.display(), "device lock released");
            }
        }
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn pid_alive(pid: u32) -> bool {
    let sys = System::new_all();
    sys.process(Pid::from_u32(pid)).is_some()
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
