// src/watch/mod.rs

pub mod classify;
pub mod stability;
pub mod watcher;

pub use classify::{classify, output_path_for, Classification, SkipReason};
pub use stability::{wait_until_stable, Stability, StabilityOptions};
pub use watcher::{bootstrap_scan, spawn_watcher, WatcherHandle};
