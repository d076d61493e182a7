// src/exec/worker.rs

//! Worker subprocess execution.
//!
//! A worker is an external one-shot program taking `(input_path,
//! output_path)` positional arguments and exiting 0 on success. The
//! engine spawns it with both output streams piped and no console
//! window, drains the pipes immediately so the child can never block
//! on a full buffer, and races the wait against the configured
//! timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cap on captured stdout/stderr per stream (1 MiB). Worker chatter
/// beyond this is discarded.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// How the worker binary is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinary {
    /// Program to spawn: the worker itself, or the runtime launcher.
    pub program: PathBuf,
    /// Arguments placed before the input/output paths (the `.dll` path
    /// when launched through the runtime launcher).
    pub prefix_args: Vec<PathBuf>,
}

/// Resolve the concrete invocation for a configured executable base
/// path.
///
/// Preference order: native executable at `<base>` (`<base>.exe` on
/// Windows), then `<base>.dll` through `launcher`. `Err` carries the
/// attempted paths for the failure diagnostic.
pub fn resolve_binary(base: &Path, launcher: &str) -> std::result::Result<ResolvedBinary, Vec<PathBuf>> {
    let mut attempted = Vec::new();

    let native = base.to_path_buf();
    if native.is_file() {
        return Ok(ResolvedBinary {
            program: native,
            prefix_args: Vec::new(),
        });
    }
    attempted.push(native);

    if cfg!(windows) {
        let exe = with_extension(base, "exe");
        if exe.is_file() {
            return Ok(ResolvedBinary {
                program: exe,
                prefix_args: Vec::new(),
            });
        }
        attempted.push(exe);
    }

    let dll = with_extension(base, "dll");
    if dll.is_file() {
        return Ok(ResolvedBinary {
            program: PathBuf::from(launcher),
            prefix_args: vec![dll],
        });
    }
    attempted.push(dll);

    Err(attempted)
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut p = base.as_os_str().to_os_string();
    p.push(".");
    p.push(ext);
    PathBuf::from(p)
}

/// Result of one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The process exited on its own.
    Exited {
        code: i32,
        stderr: String,
    },
    /// The wall-clock timeout elapsed; the process was killed.
    TimedOut,
    /// The engine was cancelled; the process was killed.
    Cancelled,
}

/// Spawn the worker and wait for it, racing the wait against `timeout`
/// and engine cancellation.
pub async fn run_worker(
    binary: &ResolvedBinary,
    input_path: &Path,
    output_path: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<WorkerOutcome> {
    info!(
        program = %binary.program.display(),
        input = %input_path.display(),
        output = %output_path.display(),
        "starting worker process"
    );

    let mut cmd = Command::new(&binary.program);
    cmd.args(&binary.prefix_args)
        .arg(input_path)
        .arg(output_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // No console window pops up for the child on Windows.
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning worker process {:?}", binary.program))?;

    // Drain both pipes from the start so the child can't deadlock on a
    // full buffer while we wait on it.
    let stdout_task = {
        let handle = child.stdout.take();
        tokio::spawn(async move { read_stream(handle).await })
    };
    let stderr_task = {
        let handle = child.stderr.take();
        tokio::spawn(async move { read_stream(handle).await })
    };

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            info!(program = %binary.program.display(), "engine cancelled; killing worker process");
            kill_child(&mut child).await;
            WorkerOutcome::Cancelled
        }
        waited = tokio::time::timeout(timeout, child.wait()) => match waited {
            Ok(status) => {
                let status = status
                    .with_context(|| format!("waiting for worker process {:?}", binary.program))?;
                let code = status.code().unwrap_or(-1);
                info!(
                    program = %binary.program.display(),
                    exit_code = code,
                    success = status.success(),
                    "worker process exited"
                );
                WorkerOutcome::Exited {
                    code,
                    stderr: String::new(),
                }
            }
            Err(_elapsed) => {
                warn!(
                    program = %binary.program.display(),
                    timeout_secs = timeout.as_secs(),
                    "worker process timed out; killing"
                );
                kill_child(&mut child).await;
                WorkerOutcome::TimedOut
            }
        }
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    if !stdout_bytes.is_empty() {
        debug!(
            program = %binary.program.display(),
            "worker stdout: {}",
            String::from_utf8_lossy(&stdout_bytes).trim()
        );
    }

    match outcome {
        WorkerOutcome::Exited { code, .. } => Ok(WorkerOutcome::Exited {
            code,
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        }),
        other => Ok(other),
    }
}

async fn kill_child(child: &mut tokio::process::Child) {
    if let Err(err) = child.kill().await {
        warn!(error = %err, "failed to kill worker process");
    }
}

/// Read an output stream to the end, capped at [`MAX_CAPTURE_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_CAPTURE_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
