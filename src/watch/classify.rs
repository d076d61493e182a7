// src/watch/classify.rs

//! Turning a path under the watch root into a routing decision.
//!
//! The first-level subdirectory name selects the worker; files sitting
//! directly in the watch root go to the configured default worker, if
//! any. Hidden and system files can be filtered out before any of
//! that.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::config::model::Settings;

/// Routing decision for one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Enqueue for `target_app`, producing `output_path`.
    Route {
        target_app: String,
        output_path: PathBuf,
    },
    /// Leave the file alone; `SkipReason` explains the log line.
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    HiddenOrSystem,
    RootWithoutDefault,
    UnknownSubdirectory,
    OutsideWatchRoot,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::HiddenOrSystem => "hidden or system file",
            SkipReason::RootWithoutDefault => {
                "file in watch root and no DefaultWorkerForRoot configured"
            }
            SkipReason::UnknownSubdirectory => "first-level directory has no worker mapping",
            SkipReason::OutsideWatchRoot => "path is outside the watch root",
        };
        f.write_str(s)
    }
}

/// Classify an absolute path against the watch root.
pub fn classify(settings: &Settings, day: &str, abs_path: &Path) -> Classification {
    let rel = match abs_path.strip_prefix(&settings.watch_directory) {
        Ok(r) => r,
        Err(_) => return Classification::Skip(SkipReason::OutsideWatchRoot),
    };

    let file_name = match rel.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return Classification::Skip(SkipReason::OutsideWatchRoot),
    };

    if settings.ignore_hidden_and_system_files && is_hidden_or_system(file_name) {
        return Classification::Skip(SkipReason::HiddenOrSystem);
    }

    let components: Vec<&str> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    match components.len() {
        0 => Classification::Skip(SkipReason::OutsideWatchRoot),
        1 => {
            // File sits directly in the watch root.
            let Some(default) = settings.default_worker_for_root.as_deref() else {
                return Classification::Skip(SkipReason::RootWithoutDefault);
            };
            let Some(mapping) = settings.mappings.get(default) else {
                return Classification::Skip(SkipReason::RootWithoutDefault);
            };
            Classification::Route {
                target_app: default.to_string(),
                output_path: output_path_for(&mapping.output_directory, day, Path::new(file_name)),
            }
        }
        _ => {
            let key = components[0];
            let Some(mapping) = settings.mappings.get(key) else {
                return Classification::Skip(SkipReason::UnknownSubdirectory);
            };
            let below_key: PathBuf = components[1..].iter().collect();
            Classification::Route {
                target_app: key.to_string(),
                output_path: output_path_for(&mapping.output_directory, day, &below_key),
            }
        }
    }
}

/// Produce the output path for a worker whose configured output root is
/// `OUT/<w>`: the day partition is inserted before the root's final
/// component, then the input's subpath below the worker directory is
/// appended, giving `OUT/<yyyy-MM-dd>/<w>/<subpath>/<filename>`.
pub fn output_path_for(output_dir: &Path, day: &str, rel_below_key: &Path) -> PathBuf {
    let parent = output_dir.parent().unwrap_or_else(|| Path::new(""));
    let leaf = output_dir.file_name().unwrap_or_default();
    parent.join(day).join(leaf).join(rel_below_key)
}

/// Hidden: name begins with a dot. System: `Thumbs.db`, any casing.
fn is_hidden_or_system(file_name: &str) -> bool {
    file_name.starts_with('.') || file_name.eq_ignore_ascii_case("Thumbs.db")
}
