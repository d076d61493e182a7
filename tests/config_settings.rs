// tests/config_settings.rs

mod common;
use crate::common::{init_tracing, settings_with_mapping};

use std::path::Path;

use tempfile::tempdir;

use filejobrouter::config::{load_and_validate, load_from_path};

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, body).expect("write config");
    path
}

#[test]
fn parses_pascal_case_config() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            "WatchDirectory": "/srv/inbox",
            "TimeoutSeconds": 120,
            "MaxRetryCount": 2,
            "LogDirectory": "logs",
            "JobsDirectory": "jobs",
            "QueueBaseDirectory": "queue",
            "MutexName": "scanner-device",
            "Mappings": {
                "abc": {
                    "ExecutablePath": "workers/{username}/abc",
                    "OutputDirectory": "out/abc"
                }
            },
            "IgnoreHiddenAndSystemFiles": true,
            "DefaultWorkerForRoot": "abc",
            "RuntimeLauncher": "dotnet"
        }"#,
    );

    let settings = load_and_validate(&path).expect("config should load");
    assert_eq!(settings.watch_directory, Path::new("/srv/inbox"));
    assert_eq!(settings.timeout_seconds, 120);
    assert_eq!(settings.max_retry_count, 2);
    assert_eq!(settings.mutex_name, "scanner-device");
    assert_eq!(settings.default_worker_for_root.as_deref(), Some("abc"));

    let mapping = settings.mappings.get("abc").expect("abc mapping");
    assert_eq!(mapping.executable_path, "workers/{username}/abc");
    assert_eq!(mapping.output_directory, Path::new("out/abc"));
}

#[test]
fn optional_fields_get_defaults() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            "WatchDirectory": "/srv/inbox",
            "Mappings": {
                "abc": { "ExecutablePath": "abc", "OutputDirectory": "out/abc" }
            }
        }"#,
    );

    let settings = load_from_path(&path).expect("config should parse");
    assert_eq!(settings.timeout_seconds, 300);
    assert_eq!(settings.max_retry_count, 3);
    assert!(settings.ignore_hidden_and_system_files);
    assert!(settings.default_worker_for_root.is_none());
    assert_eq!(settings.runtime_launcher, "dotnet");
}

#[test]
fn missing_config_file_is_an_error() {
    init_tracing();

    let dir = tempdir().unwrap();
    assert!(load_and_validate(dir.path().join("config.json")).is_err());
}

#[test]
fn malformed_json_is_an_error() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "{ not json at all");
    assert!(load_and_validate(&path).is_err());
}

#[test]
fn rejects_zero_timeout() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            "WatchDirectory": "/srv/inbox",
            "TimeoutSeconds": 0,
            "Mappings": {
                "abc": { "ExecutablePath": "abc", "OutputDirectory": "out/abc" }
            }
        }"#,
    );
    let err = load_and_validate(&path).unwrap_err();
    assert!(err.to_string().contains("TimeoutSeconds"));
}

#[test]
fn rejects_empty_mappings() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{ "WatchDirectory": "/srv/inbox", "Mappings": {} }"#,
    );
    let err = load_and_validate(&path).unwrap_err();
    assert!(err.to_string().contains("Mappings"));
}

#[test]
fn rejects_unknown_default_worker() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            "WatchDirectory": "/srv/inbox",
            "DefaultWorkerForRoot": "nope",
            "Mappings": {
                "abc": { "ExecutablePath": "abc", "OutputDirectory": "out/abc" }
            }
        }"#,
    );
    let err = load_and_validate(&path).unwrap_err();
    assert!(err.to_string().contains("DefaultWorkerForRoot"));
}

#[test]
fn rejects_mapping_with_empty_executable() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            "WatchDirectory": "/srv/inbox",
            "Mappings": {
                "abc": { "ExecutablePath": "  ", "OutputDirectory": "out/abc" }
            }
        }"#,
    );
    let err = load_and_validate(&path).unwrap_err();
    assert!(err.to_string().contains("ExecutablePath"));
}

#[test]
fn tunables_compare_by_value() {
    init_tracing();

    let a = settings_with_mapping(Path::new("/srv"), "abc", "abc").tunables();
    let mut b = settings_with_mapping(Path::new("/srv"), "abc", "abc").tunables();
    assert_eq!(a, b);
    b.timeout_seconds += 1;
    assert_ne!(a, b);
}
