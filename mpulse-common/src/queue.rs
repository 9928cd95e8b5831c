//! Job queue
//!
//! Transport between the request-serving role and the worker role,
//! backed by the shared database (the two roles hold no common
//! in-memory state). FIFO best-effort, at-least-once: a worker crash
//! between dequeue and completion loses only the queue entry, and
//! [`requeue_stale`] re-inserts it on the next sweep. Duplicate
//! delivery is tolerated by design; the job store's claim CAS makes
//! redelivery of a finished job a no-op.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::format_timestamp;
use crate::{Error, Result};

/// Enqueue a job for processing.
///
/// Idempotent: re-enqueueing an already-queued job is a no-op.
pub async fn enqueue(pool: &SqlitePool, job_id: Uuid) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO job_queue (job_id, enqueued_at) VALUES (?, ?)")
        .bind(job_id.to_string())
        .bind(format_timestamp(&Utc::now()))
        .execute(pool)
        .await?;

    Ok(())
}

/// Pop the oldest queue entry, if any.
///
/// Non-blocking; the worker polls on an interval when the queue is
/// empty. Two workers racing here may both receive the same job_id
/// (the delete is not exclusive) -- that duplicate delivery resolves at
/// the claim CAS, not here.
pub async fn dequeue(pool: &SqlitePool) -> Result<Option<Uuid>> {
    let mut tx = pool.begin().await?;

    let job_id: Option<String> = sqlx::query_scalar(
        "SELECT job_id FROM job_queue ORDER BY enqueued_at ASC, job_id ASC LIMIT 1",
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some(job_id) = job_id else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM job_queue WHERE job_id = ?")
        .bind(&job_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let job_id = Uuid::parse_str(&job_id)
        .map_err(|e| Error::Internal(format!("Failed to parse queued job_id: {}", e)))?;
    Ok(Some(job_id))
}

/// Re-enqueue jobs whose delivery was lost.
///
/// Covers two gaps: a job left `queued` with no queue entry (crash
/// between create and enqueue, or between dequeue and claim), and a
/// job stuck in `processing` past the staleness bound (worker died
/// mid-flight). Returns the number of entries re-inserted.
pub async fn requeue_stale(pool: &SqlitePool, stale_cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO job_queue (job_id, enqueued_at)
        SELECT job_id, ?
        FROM upload_jobs
        WHERE status = 'queued'
           OR (status = 'processing' AND updated_at < ?)
        "#,
    )
    .bind(format_timestamp(&Utc::now()))
    .bind(format_timestamp(&stale_cutoff))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
