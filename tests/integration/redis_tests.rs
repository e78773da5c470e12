//! Redis integration tests.
//!
//! These exercise the render queue and the admission gate against a live
//! Redis instance. Run with `--ignored` and `REDIS_URL` pointing at a
//! disposable database.

use vforge_models::policy::MAX_CONCURRENT_JOBS_PER_CLIENT;
use vforge_models::JobId;
use vforge_queue::{Admission, AdmissionGate, RenderMessage, RenderQueue};

/// Test queue connection and stream bootstrap.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_queue_connection() {
    dotenvy::dotenv().ok();

    let queue = RenderQueue::from_env().expect("Failed to create render queue");
    queue.init().await.expect("Failed to initialize stream");

    let len = queue.len().await.expect("Failed to read stream length");
    println!("Render stream length: {}", len);
}

/// Test the enqueue -> consume -> ack cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_consume_ack() {
    dotenvy::dotenv().ok();

    let queue = RenderQueue::from_env().expect("Failed to create render queue");
    queue.init().await.expect("Failed to initialize stream");

    let message = RenderMessage::generate(JobId::new());
    let id = queue
        .enqueue(&message)
        .await
        .expect("Failed to enqueue")
        .expect("First enqueue should insert");
    println!("Enqueued message {}", id);

    let consumer = format!("itest-consumer-{}", uuid::Uuid::new_v4());
    let delivered = queue
        .consume(&consumer, 5_000, 10)
        .await
        .expect("Failed to consume");

    let (message_id, received) = delivered
        .into_iter()
        .find(|(_, m)| m.job_id == message.job_id)
        .expect("Enqueued message was not delivered");
    assert_eq!(received.op, message.op);

    queue.ack(&message_id).await.expect("Failed to ack");
    queue
        .clear_dedup(&message)
        .await
        .expect("Failed to clear dedup key");
    println!("Acked message {}", message_id);
}

/// Test that re-enqueueing an in-flight operation collapses.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_duplicate_enqueue_collapses() {
    dotenvy::dotenv().ok();

    let queue = RenderQueue::from_env().expect("Failed to create render queue");
    queue.init().await.expect("Failed to initialize stream");

    let message = RenderMessage::generate(JobId::new());
    let first = queue.enqueue(&message).await.expect("Failed to enqueue");
    assert!(first.is_some(), "First enqueue should insert");

    let second = queue.enqueue(&message).await.expect("Failed to enqueue");
    assert!(second.is_none(), "Duplicate enqueue should collapse");

    // Drain our message so later runs see a clean stream.
    let consumer = format!("itest-consumer-{}", uuid::Uuid::new_v4());
    for (message_id, m) in queue
        .consume(&consumer, 5_000, 10)
        .await
        .expect("Failed to consume")
    {
        if m.job_id == message.job_id {
            queue.ack(&message_id).await.expect("Failed to ack");
        }
    }
    queue
        .clear_dedup(&message)
        .await
        .expect("Failed to clear dedup key");
}

/// Test per-message retry accounting.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_retry_counter() {
    dotenvy::dotenv().ok();

    let queue = RenderQueue::from_env().expect("Failed to create render queue");
    queue.init().await.expect("Failed to initialize stream");

    let message = RenderMessage::finalize(JobId::new());
    queue
        .enqueue(&message)
        .await
        .expect("Failed to enqueue")
        .expect("First enqueue should insert");

    let consumer = format!("itest-consumer-{}", uuid::Uuid::new_v4());
    let delivered = queue
        .consume(&consumer, 5_000, 10)
        .await
        .expect("Failed to consume");
    let (message_id, _) = delivered
        .into_iter()
        .find(|(_, m)| m.job_id == message.job_id)
        .expect("Enqueued message was not delivered");

    let count = queue
        .increment_retry(&message_id)
        .await
        .expect("Failed to increment retry counter");
    assert_eq!(count, 1);
    let count = queue
        .increment_retry(&message_id)
        .await
        .expect("Failed to increment retry counter");
    assert_eq!(count, 2);
    println!(
        "Retry counter at {} of {} allowed",
        count,
        queue.max_retries()
    );

    queue.ack(&message_id).await.expect("Failed to ack");
    queue
        .clear_dedup(&message)
        .await
        .expect("Failed to clear dedup key");
}

/// Test dead-letter placement for a failed message.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dead_letter_queue() {
    dotenvy::dotenv().ok();

    let queue = RenderQueue::from_env().expect("Failed to create render queue");
    queue.init().await.expect("Failed to initialize stream");

    let message = RenderMessage::revise_generate(JobId::new());
    queue
        .enqueue(&message)
        .await
        .expect("Failed to enqueue")
        .expect("First enqueue should insert");

    let consumer = format!("itest-consumer-{}", uuid::Uuid::new_v4());
    let delivered = queue
        .consume(&consumer, 5_000, 10)
        .await
        .expect("Failed to consume");
    let (message_id, received) = delivered
        .into_iter()
        .find(|(_, m)| m.job_id == message.job_id)
        .expect("Enqueued message was not delivered");

    let before = queue.dlq_len().await.expect("Failed to read DLQ length");
    queue
        .dlq(&message_id, &received, "integration test failure")
        .await
        .expect("Failed to dead-letter");
    let after = queue.dlq_len().await.expect("Failed to read DLQ length");
    assert!(after > before, "DLQ should grow after dead-lettering");

    queue
        .clear_dedup(&message)
        .await
        .expect("Failed to clear dedup key");
    println!("DLQ length went {} -> {}", before, after);
}

/// Test the admit -> release cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_admission_cycle() {
    dotenvy::dotenv().ok();

    let gate = AdmissionGate::from_env().expect("Failed to create admission gate");
    let client_id = format!("itest-{}", uuid::Uuid::new_v4());

    let outcome = gate
        .admit(&client_id)
        .await
        .expect("Admission check failed");
    assert_eq!(outcome, Admission::Admitted);

    let active = gate
        .active_jobs(&client_id)
        .await
        .expect("Failed to read active jobs");
    assert_eq!(active, 1);

    gate.release(&client_id).await.expect("Failed to release");
    let active = gate
        .active_jobs(&client_id)
        .await
        .expect("Failed to read active jobs");
    assert_eq!(active, 0);
    println!("Admission slot taken and returned for {}", client_id);
}

/// Test the per-client concurrency cap.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_concurrency_cap() {
    dotenvy::dotenv().ok();

    let gate = AdmissionGate::from_env().expect("Failed to create admission gate");
    let client_id = format!("itest-{}", uuid::Uuid::new_v4());

    let mut admitted = 0u32;
    for _ in 0..=MAX_CONCURRENT_JOBS_PER_CLIENT {
        match gate
            .admit(&client_id)
            .await
            .expect("Admission check failed")
        {
            Admission::Admitted => admitted += 1,
            Admission::TooManyActive { active, limit } => {
                println!("Capped at {} active (limit {})", active, limit);
                break;
            }
            Admission::RateLimited { retry_after_s } => {
                panic!("Unexpected rate limit, retry after {}s", retry_after_s)
            }
        }
    }
    assert_eq!(admitted, MAX_CONCURRENT_JOBS_PER_CLIENT);

    for _ in 0..admitted {
        gate.release(&client_id).await.expect("Failed to release");
    }
}
