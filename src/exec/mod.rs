// src/exec/mod.rs

pub mod worker;

pub use worker::{resolve_binary, run_worker, ResolvedBinary, WorkerOutcome};
