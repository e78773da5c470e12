//! Job store integration tests.
//!
//! These run against an in-memory SQLite database and need no external
//! services. Set `DATABASE_URL` and swap the helper to exercise a file.

use vforge_db::{DbConfig, JobStore};
use vforge_models::policy::PREVIEW_RESOLUTION;
use vforge_models::{Job, JobError, JobErrorKind, JobState, QualityMode};

async fn test_store() -> JobStore {
    JobStore::connect(&DbConfig::in_memory())
        .await
        .expect("Failed to open in-memory store")
}

/// Test connection and ping.
#[tokio::test]
async fn test_store_ping() {
    let store = test_store().await;
    store.ping().await.expect("Ping failed");
}

/// Test the create -> get -> update -> fail lifecycle.
#[tokio::test]
async fn test_job_lifecycle() {
    let store = test_store().await;

    let job = Job::new("itest_client", QualityMode::Balanced, PREVIEW_RESOLUTION);
    store.create_job(&job).await.expect("Failed to create job");

    let loaded = store
        .get_job(&job.job_id)
        .await
        .expect("Failed to load job")
        .expect("Job should exist");
    assert_eq!(loaded.state, JobState::Created);
    assert_eq!(loaded.client_id, "itest_client");

    let submitted = store
        .update_state(&job.job_id, JobState::Submitted, "queued")
        .await
        .expect("Failed to submit job");
    assert_eq!(submitted.state, JobState::Submitted);

    let running = store
        .update_state(&job.job_id, JobState::Running, "render_started")
        .await
        .expect("Failed to start job");
    assert_eq!(running.state, JobState::Running);

    let failed = store
        .fail_job(
            &job.job_id,
            &JobError::new(JobErrorKind::Generation, "provider rejected the request"),
            "render_failed",
        )
        .await
        .expect("Failed to fail job");
    assert_eq!(failed.state, JobState::Failed);
    assert!(failed.error.is_some());
    println!("Job {} went Created -> Failed", job.job_id);
}

/// Test that illegal state transitions are rejected.
#[tokio::test]
async fn test_invalid_transition_rejected() {
    let store = test_store().await;

    let job = Job::new("itest_client", QualityMode::Fast, PREVIEW_RESOLUTION);
    store.create_job(&job).await.expect("Failed to create job");

    let result = store
        .update_state(&job.job_id, JobState::Succeeded, "skip_ahead")
        .await;
    assert!(result.is_err(), "Created -> Succeeded must be rejected");

    // The failed update must leave the record untouched.
    let loaded = store
        .get_job(&job.job_id)
        .await
        .expect("Failed to load job")
        .expect("Job should exist");
    assert_eq!(loaded.state, JobState::Created);
}

/// Test listing with a state filter and paging.
#[tokio::test]
async fn test_list_jobs() {
    let store = test_store().await;
    let client = "itest_list_client";

    for _ in 0..3 {
        let job = Job::new(client, QualityMode::Balanced, PREVIEW_RESOLUTION);
        store.create_job(&job).await.expect("Failed to create job");
    }
    let submitted = Job::new(client, QualityMode::Balanced, PREVIEW_RESOLUTION);
    store
        .create_job(&submitted)
        .await
        .expect("Failed to create job");
    store
        .update_state(&submitted.job_id, JobState::Submitted, "queued")
        .await
        .expect("Failed to submit job");

    let all = store
        .list_jobs(client, None, 10, 0)
        .await
        .expect("Failed to list jobs");
    assert_eq!(all.len(), 4);

    let submitted_only = store
        .list_jobs(client, Some(JobState::Submitted), 10, 0)
        .await
        .expect("Failed to list jobs");
    assert_eq!(submitted_only.len(), 1);
    assert_eq!(submitted_only[0].job_id, submitted.job_id);

    let page = store
        .list_jobs(client, None, 2, 2)
        .await
        .expect("Failed to list jobs");
    assert_eq!(page.len(), 2);

    // Another client sees nothing.
    let other = store
        .list_jobs("itest_other_client", None, 10, 0)
        .await
        .expect("Failed to list jobs");
    assert!(other.is_empty());
}

/// Test the stale-running scan the worker sweeper relies on.
#[tokio::test]
async fn test_find_stale_running() {
    let store = test_store().await;

    let job = Job::new("itest_client", QualityMode::Balanced, PREVIEW_RESOLUTION);
    store.create_job(&job).await.expect("Failed to create job");
    store
        .update_state(&job.job_id, JobState::Submitted, "queued")
        .await
        .expect("Failed to submit job");
    store
        .update_state(&job.job_id, JobState::Running, "render_started")
        .await
        .expect("Failed to start job");

    // A cutoff in the future makes every running job stale.
    let stale = store
        .find_stale_running(chrono::Utc::now() + chrono::Duration::minutes(1))
        .await
        .expect("Failed to scan for stale jobs");
    assert!(stale.iter().any(|j| j.job_id == job.job_id));

    let fresh = store
        .find_stale_running(chrono::Utc::now() - chrono::Duration::hours(1))
        .await
        .expect("Failed to scan for stale jobs");
    assert!(!fresh.iter().any(|j| j.job_id == job.job_id));
}

/// Test retention deletion of old job records.
#[tokio::test]
async fn test_delete_expired() {
    let store = test_store().await;

    let job = Job::new("itest_client", QualityMode::Balanced, PREVIEW_RESOLUTION);
    store.create_job(&job).await.expect("Failed to create job");

    // Nothing is old enough yet.
    let removed = store
        .delete_expired(chrono::Utc::now() - chrono::Duration::days(1))
        .await
        .expect("Failed to sweep expired jobs");
    assert_eq!(removed, 0);

    // A future cutoff sweeps the record.
    let removed = store
        .delete_expired(chrono::Utc::now() + chrono::Duration::minutes(1))
        .await
        .expect("Failed to sweep expired jobs");
    assert!(removed >= 1);

    let gone = store
        .get_job(&job.job_id)
        .await
        .expect("Failed to load job");
    assert!(gone.is_none(), "Swept job should no longer exist");
}
