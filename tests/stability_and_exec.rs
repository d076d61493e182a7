// tests/stability_and_exec.rs

mod common;
use crate::common::{init_tracing, with_timeout, TestResult};

use std::path::PathBuf;
use std::time::Duration;

use tempfile::tempdir;

use filejobrouter::exec::{resolve_binary, ResolvedBinary};
use filejobrouter::watch::{wait_until_stable, Stability, StabilityOptions};

fn fast_options() -> StabilityOptions {
    StabilityOptions {
        max_samples: 6,
        interval: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn quiet_file_is_declared_stable() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let path = dir.path().join("quiet.txt");
        std::fs::write(&path, "settled")?;

        assert_eq!(
            wait_until_stable(&path, fast_options()).await,
            Stability::Stable
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn missing_file_is_vanished() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let path = dir.path().join("never-existed.txt");

        assert_eq!(
            wait_until_stable(&path, fast_options()).await,
            Stability::Vanished
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn empty_file_is_stable_at_length_zero() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "")?;

        assert_eq!(
            wait_until_stable(&path, fast_options()).await,
            Stability::Stable
        );
        Ok(())
    })
    .await
}

#[test]
fn resolve_prefers_native_executable() {
    init_tracing();

    let dir = tempdir().unwrap();
    let base = dir.path().join("worker");
    std::fs::write(&base, "#!/bin/sh\n").unwrap();

    let resolved = resolve_binary(&base, "dotnet").expect("native binary resolves");
    assert_eq!(
        resolved,
        ResolvedBinary {
            program: base,
            prefix_args: Vec::new(),
        }
    );
}

#[test]
fn resolve_falls_back_to_dll_through_launcher() {
    init_tracing();

    let dir = tempdir().unwrap();
    let base = dir.path().join("worker");
    let dll = dir.path().join("worker.dll");
    std::fs::write(&dll, "not really a dll").unwrap();

    let resolved = resolve_binary(&base, "dotnet").expect("dll resolves via launcher");
    assert_eq!(resolved.program, PathBuf::from("dotnet"));
    assert_eq!(resolved.prefix_args, vec![dll]);
}

#[test]
fn resolve_reports_every_attempted_path() {
    init_tracing();

    let dir = tempdir().unwrap();
    let base = dir.path().join("worker");

    let attempted = resolve_binary(&base, "dotnet").expect_err("nothing to resolve");
    assert!(attempted.contains(&base));
    assert!(attempted.contains(&dir.path().join("worker.dll")));
}
