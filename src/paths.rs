// src/paths.rs

//! Path helpers: day partitions, solution-root discovery and token
//! expansion for configured executable paths.
//!
//! The "current day" for every component is the day in effect when the
//! engine started, so queue, logs and job records stay consistent across
//! a midnight rollover.

use std::path::{Path, PathBuf};

use chrono::Local;

/// Format used for all day partition directories.
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Compute the day partition string for right now.
///
/// Call once at engine startup and pass the value around; never
/// recompute it mid-run.
pub fn startup_day() -> String {
    Local::now().format(DAY_FORMAT).to_string()
}

/// The OS user under which the engine runs.
pub fn current_user() -> String {
    whoami::username()
}

/// Walk up from the running executable looking for the nearest ancestor
/// directory that contains a `config.json`.
///
/// Falls back to the current working directory when no ancestor
/// qualifies (e.g. running from a scratch build dir).
pub fn discover_solution_root() -> PathBuf {
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));

    let mut dir = exe.parent().map(Path::to_path_buf);
    while let Some(d) = dir {
        if d.join("config.json").is_file() {
            return d;
        }
        dir = d.parent().map(Path::to_path_buf);
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Resolve a possibly-relative configured directory against the solution
/// root.
pub fn resolve_against_root(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

/// Day-local log directory: `<log_base>/<user>/<day>`.
pub fn day_log_dir(log_base: &Path, user: &str, day: &str) -> PathBuf {
    log_base.join(user).join(day)
}

/// Day-local job-record directory: `<jobs_base>/<user>/<day>`.
pub fn day_jobs_dir(jobs_base: &Path, user: &str, day: &str) -> PathBuf {
    jobs_base.join(user).join(day)
}

/// Day partition of the queue: `<queue_base>/<day>/queue.json`.
pub fn day_queue_file(queue_base: &Path, day: &str) -> PathBuf {
    queue_base.join(day).join("queue.json")
}

/// Expand `{username}`, `{day}` and OS environment variables (both
/// `%NAME%` and `${NAME}` forms) in a configured executable path.
///
/// Unknown environment variables expand to the empty string.
pub fn expand_tokens(raw: &str, user: &str, day: &str) -> String {
    let mut s = raw.replace("{username}", user).replace("{day}", day);
    s = expand_env_percent(&s);
    expand_env_dollar(&s)
}

fn expand_env_percent(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let name = &after[..end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated marker; keep the literal remainder.
                out.push('%');
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_env_dollar(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);
    out
}
