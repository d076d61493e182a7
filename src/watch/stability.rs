// src/watch/stability.rs

//! Debouncing writes into a "stable file" signal.
//!
//! A file is stable when two consecutive length samples agree and the
//! file can be opened for shared read. Writers that copy in large
//! files therefore get a full sample interval of quiet before the
//! router touches their file.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

/// Outcome of a stability wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Two consecutive samples agreed and a shared-read open succeeded.
    Stable,
    /// The file disappeared while sampling.
    Vanished,
    /// The sample budget ran out with the file still changing.
    NeverSettled,
}

#[derive(Debug, Clone, Copy)]
pub struct StabilityOptions {
    /// Maximum number of length samples before giving up.
    pub max_samples: u32,
    /// Pause between samples.
    pub interval: Duration,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            max_samples: 10,
            interval: Duration::from_millis(500),
        }
    }
}

/// Wait until `path` is stable, vanished, or the budget is exhausted.
pub async fn wait_until_stable(path: &Path, options: StabilityOptions) -> Stability {
    let mut previous_len: Option<u64> = None;

    for sample in 0..options.max_samples {
        let len = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == ErrorKind::NotFound => return Stability::Vanished,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "length sample failed");
                previous_len = None;
                tokio::time::sleep(options.interval).await;
                continue;
            }
        };

        let open_ok = File::open(path).is_ok();

        if open_ok && previous_len == Some(len) {
            debug!(path = %path.display(), len, sample, "file is stable");
            return Stability::Stable;
        }

        previous_len = Some(len);
        tokio::time::sleep(options.interval).await;
    }

    Stability::NeverSettled
}
