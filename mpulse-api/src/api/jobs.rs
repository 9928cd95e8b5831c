//! Job status endpoints
//!
//! Everything here is owner-scoped: a job id belonging to another user
//! answers 404, indistinguishable from an id that does not exist.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mpulse_common::db::jobs;
use mpulse_common::models::{JobStatus, UploadJob};

use crate::error::{ApiError, ApiResult};
use crate::extract::OwnerId;
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Caller-facing job view
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub filename: String,
    pub status: JobStatus,
    /// Coarse lifecycle hint (0 queued, 50 processing, 100 terminal)
    pub progress_hint: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UploadJob> for JobStatusResponse {
    fn from(job: UploadJob) -> Self {
        Self {
            job_id: job.job_id,
            filename: job.original_filename,
            status: job.status,
            progress_hint: job.status.progress_hint(),
            row_count: job.row_count,
            column_count: job.column_count,
            headers: job.headers,
            error_reason: job.error_reason,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /dashboard/jobs/:job_id/status
pub async fn job_status(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = jobs::get_for_owner(&state.db, job_id, owner_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {job_id}")))?;

    Ok(Json(job.into()))
}

/// GET /dashboard/jobs?limit=&offset=
///
/// Newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<JobStatusResponse>>> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let jobs = jobs::list_for_owner(&state.db, owner_id, limit, offset).await?;
    Ok(Json(jobs.into_iter().map(JobStatusResponse::from).collect()))
}

/// Build job status routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/jobs", get(list_jobs))
        .route("/dashboard/jobs/:job_id/status", get(job_status))
}
