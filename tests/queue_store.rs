// tests/queue_store.rs

mod common;
use crate::common::{init_tracing, with_timeout, TestResult};

use chrono::{Duration as ChronoDuration, Utc};
use tempfile::tempdir;

use filejobrouter::queue::{AddOutcome, Job, JobStatus, QueueStore};

fn job_for(input: &str) -> Job {
    Job::new(input, "", "abc", "tester")
}

#[tokio::test]
async fn save_then_load_round_trips() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        let mut a = job_for("/in/abc/a.txt");
        a.status = JobStatus::Completed;
        a.completed_at = Some(Utc::now());
        a.error_message = Some("unused diagnostic".to_string());
        let b = job_for("/in/abc/b.txt");

        store.save(&[a.clone(), b.clone()]).await?;
        let loaded = store.load().await;

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, a.id);
        assert_eq!(loaded[0].status, JobStatus::Completed);
        assert_eq!(loaded[0].error_message.as_deref(), Some("unused diagnostic"));
        assert_eq!(loaded[1].id, b.id);
        assert_eq!(loaded[1].status, JobStatus::Pending);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn missing_queue_file_loads_empty() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");
        assert!(store.load().await.is_empty());
        assert!(store.next_pending().await.is_none());

        Ok(())
    })
    .await
}

#[tokio::test]
async fn add_suppresses_duplicate_active_input() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        let first = job_for("/in/abc/same.txt");
        assert_eq!(store.add(first).await?, AddOutcome::Added);

        let second = job_for("/in/abc/same.txt");
        assert_eq!(store.add(second).await?, AddOutcome::DuplicateActive);

        assert_eq!(store.load().await.len(), 1);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn completed_job_does_not_block_reenqueue() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        let mut done = job_for("/in/abc/again.txt");
        done.status = JobStatus::Completed;
        store.save(&[done]).await?;

        // Re-dropping the same filename is a legitimate new job.
        let fresh = job_for("/in/abc/again.txt");
        assert_eq!(store.add(fresh).await?, AddOutcome::Added);
        assert_eq!(store.load().await.len(), 2);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn next_pending_is_oldest_by_creation_time() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        let mut newer = job_for("/in/abc/newer.txt");
        let mut older = job_for("/in/abc/older.txt");
        older.created_at = Utc::now() - ChronoDuration::seconds(60);
        let mut done = job_for("/in/abc/done.txt");
        done.created_at = Utc::now() - ChronoDuration::seconds(120);
        done.status = JobStatus::Completed;
        newer.created_at = Utc::now();

        store.save(&[newer, done, older.clone()]).await?;

        let next = store.next_pending().await.expect("a pending job");
        assert_eq!(next.id, older.id);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn recover_rescues_processing_jobs_and_is_idempotent() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        let mut stuck = job_for("/in/abc/stuck.txt");
        stuck.status = JobStatus::Processing;
        stuck.started_at = Some(Utc::now());
        let untouched = job_for("/in/abc/waiting.txt");
        store.save(&[stuck.clone(), untouched.clone()]).await?;

        assert_eq!(store.recover().await?, 1);

        let jobs = store.load().await;
        let rescued = jobs.iter().find(|j| j.id == stuck.id).expect("rescued job");
        assert_eq!(rescued.status, JobStatus::Pending);
        assert!(rescued.started_at.is_none());
        assert_eq!(
            rescued.error_message.as_deref(),
            Some("Recovered from previous session")
        );

        let other = jobs.iter().find(|j| j.id == untouched.id).expect("other job");
        assert_eq!(other.status, JobStatus::Pending);
        assert!(other.error_message.is_none());

        // Calling recover again changes nothing.
        assert_eq!(store.recover().await?, 0);
        let again = store.load().await;
        assert_eq!(serde_json::to_value(&again)?, serde_json::to_value(&jobs)?);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn update_replaces_job_by_id() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        let mut job = job_for("/in/abc/u.txt");
        store.add(job.clone()).await?;

        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        store.update(&job).await?;

        let loaded = store.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, JobStatus::Processing);
        assert!(loaded[0].started_at.is_some());

        Ok(())
    })
    .await
}

#[tokio::test]
async fn update_unknown_job_is_an_error() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        let ghost = job_for("/in/abc/ghost.txt");
        assert!(store.update(&ghost).await.is_err());

        Ok(())
    })
    .await
}

#[tokio::test]
async fn queue_file_uses_pascal_case_and_integer_status() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        let mut job = job_for("/in/abc/wire.txt");
        job.status = JobStatus::Timeout;
        store.save(std::slice::from_ref(&job)).await?;

        let raw = std::fs::read_to_string(store.queue_file())?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let entry = &value[0];

        assert_eq!(entry["Status"], serde_json::json!(4));
        assert_eq!(entry["InputPath"], serde_json::json!("/in/abc/wire.txt"));
        assert_eq!(entry["TargetApp"], serde_json::json!("abc"));
        assert_eq!(entry["RetryCount"], serde_json::json!(0));
        assert!(entry["Id"].is_string());
        assert!(entry["CreatedAt"].is_string());

        Ok(())
    })
    .await
}

#[tokio::test]
async fn queue_file_is_valid_json_after_repeated_saves() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        for i in 0..20 {
            let job = job_for(&format!("/in/abc/f{i}.txt"));
            store.add(job).await?;
            let raw = std::fs::read_to_string(store.queue_file())?;
            let parsed: Vec<Job> = serde_json::from_str(&raw)?;
            assert_eq!(parsed.len(), i + 1);
        }

        Ok(())
    })
    .await
}

#[tokio::test]
async fn corrupt_queue_file_loads_empty() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempdir()?;
        let store = QueueStore::new(dir.path(), "2026-08-02");

        std::fs::create_dir_all(store.queue_file().parent().unwrap())?;
        std::fs::write(store.queue_file(), "{ not json")?;

        assert!(store.load().await.is_empty());
        Ok(())
    })
    .await
}
