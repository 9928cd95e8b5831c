//! Job store and queue integration tests
//!
//! Exercises the claim/complete/fail compare-and-swap semantics and the
//! at-least-once queue against a real on-disk SQLite database.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use mpulse_common::db::jobs::{self, ClaimOutcome, TableMeta, TransitionOutcome};
use mpulse_common::db::{alerts, sentiments, trends};
use mpulse_common::models::{JobStatus, MarketTrendPoint, NewAlert, NewUploadJob, SentimentRecord};
use mpulse_common::queue;

/// Create temporary test database; TempDir must outlive the pool
async fn test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_mpulse.db");
    let pool = mpulse_common::db::init_database_pool(&db_path)
        .await
        .unwrap();
    (temp_dir, pool)
}

fn new_job(owner_id: Uuid) -> NewUploadJob {
    NewUploadJob {
        owner_id,
        original_filename: "data.csv".to_string(),
        declared_size: 42,
        declared_extension: "csv".to_string(),
        spool_path: "/tmp/spool/data.csv".to_string(),
    }
}

/// Cutoff in the past relative to every row: nothing counts as stale
fn fresh_cutoff() -> chrono::DateTime<Utc> {
    Utc::now() - Duration::hours(1)
}

/// Cutoff in the future: every processing row counts as stale
fn everything_stale_cutoff() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::hours(1)
}

fn table_meta() -> TableMeta {
    TableMeta {
        row_count: 3,
        column_count: 2,
        headers: vec!["name".to_string(), "note".to_string()],
    }
}

#[tokio::test]
async fn created_jobs_get_unique_ids_and_start_queued() {
    let (_dir, pool) = test_db().await;
    let owner = Uuid::new_v4();

    let mut seen = std::collections::HashSet::new();
    for _ in 0..20 {
        let job = jobs::create(&pool, &new_job(owner)).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(seen.insert(job.job_id), "job_id reused");
    }
}

#[tokio::test]
async fn claim_moves_queued_job_to_processing() {
    let (_dir, pool) = test_db().await;
    let job = jobs::create(&pool, &new_job(Uuid::new_v4())).await.unwrap();

    let outcome = jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap();
    assert_eq!(outcome, ClaimOutcome::Claimed { attempt: 1 });

    let reloaded = jobs::get(&pool, job.job_id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Processing);
    assert!(reloaded.updated_at >= job.updated_at);
}

#[tokio::test]
async fn second_claim_on_fresh_processing_job_conflicts() {
    // Two workers receive the same redelivered job_id. Exactly one
    // claim succeeds; the other observes Conflict.
    let (_dir, pool) = test_db().await;
    let job = jobs::create(&pool, &new_job(Uuid::new_v4())).await.unwrap();

    let first = jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap();
    let second = jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap();

    assert_eq!(first, ClaimOutcome::Claimed { attempt: 1 });
    assert_eq!(second, ClaimOutcome::Conflict);
}

#[tokio::test]
async fn stale_processing_job_can_be_reclaimed_with_new_attempt() {
    let (_dir, pool) = test_db().await;
    let job = jobs::create(&pool, &new_job(Uuid::new_v4())).await.unwrap();

    assert_eq!(
        jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap(),
        ClaimOutcome::Claimed { attempt: 1 }
    );

    // Treat the first claim as abandoned (cutoff in the future)
    let takeover = jobs::claim(&pool, job.job_id, everything_stale_cutoff())
        .await
        .unwrap();
    assert_eq!(takeover, ClaimOutcome::Claimed { attempt: 2 });
}

#[tokio::test]
async fn claim_returns_its_own_fencing_token() {
    // The token must come from the claiming UPDATE itself: a chain of
    // takeovers sees strictly increasing attempts with no repeats,
    // never another claimer's value read after the fact.
    let (_dir, pool) = test_db().await;
    let job = jobs::create(&pool, &new_job(Uuid::new_v4())).await.unwrap();

    for expected in 1i64..=3 {
        let claimed = jobs::claim(&pool, job.job_id, everything_stale_cutoff())
            .await
            .unwrap();
        assert_eq!(claimed, ClaimOutcome::Claimed { attempt: expected });
    }
}

#[tokio::test]
async fn terminal_job_cannot_be_claimed_even_as_stale() {
    let (_dir, pool) = test_db().await;
    let job = jobs::create(&pool, &new_job(Uuid::new_v4())).await.unwrap();

    jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap();
    jobs::complete(&pool, job.job_id, 1, &table_meta(), &[], &[])
        .await
        .unwrap();

    let outcome = jobs::claim(&pool, job.job_id, everything_stale_cutoff())
        .await
        .unwrap();
    assert_eq!(outcome, ClaimOutcome::Conflict);
}

#[tokio::test]
async fn complete_persists_metadata_and_derived_rows_atomically() {
    let (_dir, pool) = test_db().await;
    let owner = Uuid::new_v4();
    let job = jobs::create(&pool, &new_job(owner)).await.unwrap();
    jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap();

    let now = Utc::now();
    let trend_rows = vec![MarketTrendPoint {
        owner_id: owner,
        keyword: "service".to_string(),
        trend_score: 66.7,
        collected_at: now,
    }];
    let sentiment_rows = vec![SentimentRecord {
        owner_id: owner,
        keyword: "service".to_string(),
        sentiment_score: 0.8,
        mention_count: 2,
        collected_at: now,
    }];

    let outcome = jobs::complete(&pool, job.job_id, 1, &table_meta(), &trend_rows, &sentiment_rows)
        .await
        .unwrap();
    assert_eq!(outcome, TransitionOutcome::Applied);

    let reloaded = jobs::get(&pool, job.job_id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Completed);
    assert_eq!(reloaded.row_count, Some(3));
    assert_eq!(reloaded.column_count, Some(2));
    assert_eq!(
        reloaded.headers,
        Some(vec!["name".to_string(), "note".to_string()])
    );
    assert_eq!(reloaded.error_reason, None);

    let trends = trends::recent_for_owner(&pool, owner, 10).await.unwrap();
    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].keyword, "service");

    let sentiments = sentiments::recent_for_owner(&pool, owner, 10).await.unwrap();
    assert_eq!(sentiments.len(), 1);
    assert_eq!(sentiments[0].mention_count, 2);
}

#[tokio::test]
async fn stale_attempt_cannot_complete_and_leaves_no_rows() {
    // Worker A claims, goes silent; worker B takes over the stale
    // lease and completes. A's late completion must be a no-op with
    // no duplicate derived rows.
    let (_dir, pool) = test_db().await;
    let owner = Uuid::new_v4();
    let job = jobs::create(&pool, &new_job(owner)).await.unwrap();

    jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap(); // attempt 1
    let takeover = jobs::claim(&pool, job.job_id, everything_stale_cutoff())
        .await
        .unwrap();
    assert_eq!(takeover, ClaimOutcome::Claimed { attempt: 2 });

    let rows = vec![MarketTrendPoint {
        owner_id: owner,
        keyword: "wait times".to_string(),
        trend_score: 50.0,
        collected_at: Utc::now(),
    }];

    // Worker B (attempt 2) completes
    assert_eq!(
        jobs::complete(&pool, job.job_id, 2, &table_meta(), &rows, &[])
            .await
            .unwrap(),
        TransitionOutcome::Applied
    );

    // Worker A (attempt 1) arrives late: fenced out, nothing inserted
    assert_eq!(
        jobs::complete(&pool, job.job_id, 1, &table_meta(), &rows, &[])
            .await
            .unwrap(),
        TransitionOutcome::Conflict
    );

    let trends = trends::recent_for_owner(&pool, owner, 10).await.unwrap();
    assert_eq!(trends.len(), 1, "late completion must not duplicate rows");
}

#[tokio::test]
async fn fail_records_reason_and_is_terminal() {
    let (_dir, pool) = test_db().await;
    let job = jobs::create(&pool, &new_job(Uuid::new_v4())).await.unwrap();
    jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap();

    let outcome = jobs::fail(&pool, job.job_id, 1, "File is empty").await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Applied);

    let reloaded = jobs::get(&pool, job.job_id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, JobStatus::Failed);
    assert_eq!(reloaded.error_reason.as_deref(), Some("File is empty"));
    assert_eq!(reloaded.row_count, None);
    assert_eq!(reloaded.headers, None);

    // No transition out of a terminal state
    assert_eq!(
        jobs::complete(&pool, job.job_id, 1, &table_meta(), &[], &[])
            .await
            .unwrap(),
        TransitionOutcome::Conflict
    );
}

#[tokio::test]
async fn status_rank_is_monotone_across_lifecycle() {
    let (_dir, pool) = test_db().await;
    let job = jobs::create(&pool, &new_job(Uuid::new_v4())).await.unwrap();

    let mut last_rank = jobs::get(&pool, job.job_id).await.unwrap().unwrap().status.rank();

    jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap();
    let rank = jobs::get(&pool, job.job_id).await.unwrap().unwrap().status.rank();
    assert!(rank >= last_rank);
    last_rank = rank;

    jobs::complete(&pool, job.job_id, 1, &table_meta(), &[], &[])
        .await
        .unwrap();
    let rank = jobs::get(&pool, job.job_id).await.unwrap().unwrap().status.rank();
    assert!(rank >= last_rank);
}

#[tokio::test]
async fn list_for_owner_is_scoped_and_newest_first() {
    let (_dir, pool) = test_db().await;
    let owner_a = Uuid::new_v4();
    let owner_b = Uuid::new_v4();

    for _ in 0..3 {
        jobs::create(&pool, &new_job(owner_a)).await.unwrap();
    }
    jobs::create(&pool, &new_job(owner_b)).await.unwrap();

    let listed = jobs::list_for_owner(&pool, owner_a, 10, 0).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|j| j.owner_id == owner_a));
    assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn get_for_owner_hides_other_owners_jobs() {
    let (_dir, pool) = test_db().await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let job = jobs::create(&pool, &new_job(owner)).await.unwrap();

    assert!(jobs::get_for_owner(&pool, job.job_id, owner)
        .await
        .unwrap()
        .is_some());
    // Same answer as an unknown ID: None
    assert!(jobs::get_for_owner(&pool, job.job_id, stranger)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn queue_is_fifo_and_drains() {
    let (_dir, pool) = test_db().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    queue::enqueue(&pool, first).await.unwrap();
    // enqueued_at has microsecond precision; make ordering unambiguous
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    queue::enqueue(&pool, second).await.unwrap();

    assert_eq!(queue::dequeue(&pool).await.unwrap(), Some(first));
    assert_eq!(queue::dequeue(&pool).await.unwrap(), Some(second));
    assert_eq!(queue::dequeue(&pool).await.unwrap(), None);
}

#[tokio::test]
async fn enqueue_is_idempotent() {
    let (_dir, pool) = test_db().await;
    let job_id = Uuid::new_v4();

    queue::enqueue(&pool, job_id).await.unwrap();
    queue::enqueue(&pool, job_id).await.unwrap();

    assert_eq!(queue::dequeue(&pool).await.unwrap(), Some(job_id));
    assert_eq!(queue::dequeue(&pool).await.unwrap(), None);
}

#[tokio::test]
async fn requeue_stale_redelivers_lost_jobs() {
    let (_dir, pool) = test_db().await;
    let job = jobs::create(&pool, &new_job(Uuid::new_v4())).await.unwrap();

    // Simulate crash between dequeue and claim: queued job, empty queue
    let requeued = queue::requeue_stale(&pool, Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(requeued, 1);
    assert_eq!(queue::dequeue(&pool).await.unwrap(), Some(job.job_id));

    // Simulate crash mid-processing: stale processing job, empty queue
    jobs::claim(&pool, job.job_id, Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    let requeued = queue::requeue_stale(&pool, Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(requeued, 1);
    assert_eq!(queue::dequeue(&pool).await.unwrap(), Some(job.job_id));
}

#[tokio::test]
async fn completed_jobs_are_not_requeued() {
    let (_dir, pool) = test_db().await;
    let job = jobs::create(&pool, &new_job(Uuid::new_v4())).await.unwrap();
    jobs::claim(&pool, job.job_id, fresh_cutoff()).await.unwrap();
    jobs::complete(&pool, job.job_id, 1, &table_meta(), &[], &[])
        .await
        .unwrap();

    let requeued = queue::requeue_stale(&pool, Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(requeued, 0);
    assert_eq!(queue::dequeue(&pool).await.unwrap(), None);
}

#[tokio::test]
async fn alerts_are_append_only_and_owner_scoped() {
    let (_dir, pool) = test_db().await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    alerts::insert(
        &pool,
        &NewAlert {
            owner_id: owner,
            alert_type: "sentiment_shift".to_string(),
            message: "Sentiment for 'wait times' dropped sharply".to_string(),
        },
    )
    .await
    .unwrap();

    let recent = alerts::recent_for_owner(&pool, owner, 5).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert!(!recent[0].is_read);

    // A stranger can neither see nor mark the alert
    assert!(alerts::recent_for_owner(&pool, stranger, 5)
        .await
        .unwrap()
        .is_empty());
    assert!(!alerts::mark_read(&pool, stranger, recent[0].id).await.unwrap());

    assert!(alerts::mark_read(&pool, owner, recent[0].id).await.unwrap());
    let recent = alerts::recent_for_owner(&pool, owner, 5).await.unwrap();
    assert!(recent[0].is_read);
}
