//! Upload job store
//!
//! Durable record of job identity, status, and result metadata. Status
//! transitions are guarded compare-and-swap updates: the `WHERE` clause
//! re-checks the expected current state, and zero affected rows means
//! [`TransitionOutcome::Conflict`]. That CAS is the arbiter when two
//! workers race on a redelivered job.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp};
use crate::models::{JobStatus, MarketTrendPoint, NewUploadJob, SentimentRecord, UploadJob};
use crate::{Error, Result};

/// Result of a guarded status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The CAS matched and the transition was applied
    Applied,
    /// The job was not in the expected state (duplicate or out-of-order
    /// delivery); nothing was changed
    Conflict,
}

/// Successful claim of a job by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The worker now owns the job; `attempt` is its fencing token
    Claimed { attempt: i64 },
    /// Another worker holds the job, or it is already terminal
    Conflict,
}

/// Parse metadata persisted alongside the `completed` transition
#[derive(Debug, Clone)]
pub struct TableMeta {
    pub row_count: i64,
    pub column_count: i64,
    pub headers: Vec<String>,
}

/// Insert a new job at status `queued` with a fresh identifier
pub async fn create(pool: &SqlitePool, new: &NewUploadJob) -> Result<UploadJob> {
    let job = UploadJob {
        job_id: Uuid::new_v4(),
        owner_id: new.owner_id,
        original_filename: new.original_filename.clone(),
        declared_size: new.declared_size,
        declared_extension: new.declared_extension.clone(),
        spool_path: new.spool_path.clone(),
        status: JobStatus::Queued,
        attempt: 0,
        row_count: None,
        column_count: None,
        headers: None,
        error_reason: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO upload_jobs (
            job_id, owner_id, original_filename, declared_size,
            declared_extension, spool_path, status, attempt,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(job.job_id.to_string())
    .bind(job.owner_id.to_string())
    .bind(&job.original_filename)
    .bind(job.declared_size)
    .bind(&job.declared_extension)
    .bind(&job.spool_path)
    .bind(job.status.as_str())
    .bind(format_timestamp(&job.created_at))
    .bind(format_timestamp(&job.updated_at))
    .execute(pool)
    .await?;

    Ok(job)
}

/// Load a job by ID
pub async fn get(pool: &SqlitePool, job_id: Uuid) -> Result<Option<UploadJob>> {
    let row = sqlx::query("SELECT * FROM upload_jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| job_from_row(&r)).transpose()
}

/// Load a job only if it belongs to `owner_id`.
///
/// The API's ownership check: a non-owner query gets `None`, the same
/// answer as an unknown ID, so job identifiers cannot be probed.
pub async fn get_for_owner(
    pool: &SqlitePool,
    job_id: Uuid,
    owner_id: Uuid,
) -> Result<Option<UploadJob>> {
    let row = sqlx::query("SELECT * FROM upload_jobs WHERE job_id = ? AND owner_id = ?")
        .bind(job_id.to_string())
        .bind(owner_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| job_from_row(&r)).transpose()
}

/// List an owner's jobs, newest first
pub async fn list_for_owner(
    pool: &SqlitePool,
    owner_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<UploadJob>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM upload_jobs
        WHERE owner_id = ?
        ORDER BY created_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(owner_id.to_string())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Atomically claim a job for processing.
///
/// Succeeds when the job is `queued`, or when it is `processing` but
/// its `updated_at` predates `stale_cutoff` (lease takeover of a job
/// abandoned by a crashed worker). The claim bumps `attempt`; the new
/// value fences the final transition so a zombie worker holding an old
/// token can never complete or fail the job.
pub async fn claim(
    pool: &SqlitePool,
    job_id: Uuid,
    stale_cutoff: DateTime<Utc>,
) -> Result<ClaimOutcome> {
    let now = format_timestamp(&Utc::now());

    // Single statement: the bumped attempt comes back from the same
    // UPDATE that took the lease, so the returned token is always the
    // claimer's own, even if another takeover lands immediately after
    let attempt: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE upload_jobs
        SET status = 'processing', attempt = attempt + 1, updated_at = ?
        WHERE job_id = ?
          AND (status = 'queued'
               OR (status = 'processing' AND updated_at < ?))
        RETURNING attempt
        "#,
    )
    .bind(&now)
    .bind(job_id.to_string())
    .bind(format_timestamp(&stale_cutoff))
    .fetch_optional(pool)
    .await?;

    match attempt {
        Some(attempt) => Ok(ClaimOutcome::Claimed { attempt }),
        None => Ok(ClaimOutcome::Conflict),
    }
}

/// Persist results and mark the job `completed` as one logical unit.
///
/// A single transaction covers the derived-row inserts, the parse
/// metadata, and the `processing -> completed` CAS (fenced by
/// `attempt`). A conflict rolls the whole transaction back, so a
/// redelivered job can never land duplicate result rows.
pub async fn complete(
    pool: &SqlitePool,
    job_id: Uuid,
    attempt: i64,
    meta: &TableMeta,
    trends: &[MarketTrendPoint],
    sentiments: &[SentimentRecord],
) -> Result<TransitionOutcome> {
    let headers_json = serde_json::to_string(&meta.headers)
        .map_err(|e| Error::Internal(format!("Failed to serialize headers: {}", e)))?;
    let now = format_timestamp(&Utc::now());

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE upload_jobs
        SET status = 'completed',
            row_count = ?,
            column_count = ?,
            headers = ?,
            error_reason = NULL,
            updated_at = ?
        WHERE job_id = ? AND status = 'processing' AND attempt = ?
        "#,
    )
    .bind(meta.row_count)
    .bind(meta.column_count)
    .bind(&headers_json)
    .bind(&now)
    .bind(job_id.to_string())
    .bind(attempt)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(TransitionOutcome::Conflict);
    }

    for point in trends {
        crate::db::trends::insert(&mut *tx, point).await?;
    }
    for record in sentiments {
        crate::db::sentiments::insert(&mut *tx, record).await?;
    }

    // A stale redelivery entry for a finished job is dead weight
    sqlx::query("DELETE FROM job_queue WHERE job_id = ?")
        .bind(job_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(TransitionOutcome::Applied)
}

/// Mark the job `failed` with a caller-safe reason (fenced by `attempt`)
pub async fn fail(
    pool: &SqlitePool,
    job_id: Uuid,
    attempt: i64,
    reason: &str,
) -> Result<TransitionOutcome> {
    let now = format_timestamp(&Utc::now());

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE upload_jobs
        SET status = 'failed', error_reason = ?, updated_at = ?
        WHERE job_id = ? AND status = 'processing' AND attempt = ?
        "#,
    )
    .bind(reason)
    .bind(&now)
    .bind(job_id.to_string())
    .bind(attempt)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(TransitionOutcome::Conflict);
    }

    sqlx::query("DELETE FROM job_queue WHERE job_id = ?")
        .bind(job_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(TransitionOutcome::Applied)
}

fn job_from_row(row: &SqliteRow) -> Result<UploadJob> {
    let job_id: String = row.get("job_id");
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|e| Error::Internal(format!("Failed to parse job_id: {}", e)))?;

    let owner_id: String = row.get("owner_id");
    let owner_id = Uuid::parse_str(&owner_id)
        .map_err(|e| Error::Internal(format!("Failed to parse owner_id: {}", e)))?;

    let status: String = row.get("status");
    let status = JobStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown job status '{}'", status)))?;

    let headers: Option<String> = row.get("headers");
    let headers = headers
        .map(|h| serde_json::from_str::<Vec<String>>(&h))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize headers: {}", e)))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(UploadJob {
        job_id,
        owner_id,
        original_filename: row.get("original_filename"),
        declared_size: row.get("declared_size"),
        declared_extension: row.get("declared_extension"),
        spool_path: row.get("spool_path"),
        status,
        attempt: row.get("attempt"),
        row_count: row.get("row_count"),
        column_count: row.get("column_count"),
        headers,
        error_reason: row.get("error_reason"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
