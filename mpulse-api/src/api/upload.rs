//! Upload acceptance endpoint
//!
//! Validates the submitted file, spools its bytes to disk, records the
//! job as `queued`, and enqueues it for the worker. No parsing or
//! analysis happens here; the caller gets a job id back immediately
//! and polls the status endpoint.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use mpulse_common::db::jobs;
use mpulse_common::models::NewUploadJob;
use mpulse_common::queue;
use mpulse_common::validate;

use crate::error::{ApiError, ApiResult};
use crate::extract::OwnerId;
use crate::AppState;

/// Accepted-upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
    pub filename: String,
    pub size: u64,
    pub status: &'static str,
}

/// POST /dashboard/upload
///
/// Multipart form with a single `file` field. Rejections are final and
/// leave no job behind; acceptance creates a `queued` job whose
/// processing happens out of band.
pub async fn upload_file(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Missing filename".to_string()))?
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(ApiError::BadRequest("Missing 'file' field".to_string()));
    };

    // Multipart carries no trustworthy declared size; the observed
    // byte length is the declared size from here on
    let size = bytes.len() as u64;
    state
        .validator
        .validate(&filename, size, &bytes)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // The validator guarantees an allowed extension at this point
    let extension = validate::file_extension(&filename)
        .ok_or_else(|| ApiError::BadRequest("Missing file extension".to_string()))?;

    let spool_dir = &state.config.upload.spool_dir;
    tokio::fs::create_dir_all(spool_dir).await?;
    let spool_path = spool_dir.join(format!("{}.{}", Uuid::new_v4(), extension));
    tokio::fs::write(&spool_path, &bytes).await?;

    let job = jobs::create(
        &state.db,
        &NewUploadJob {
            owner_id,
            original_filename: filename.clone(),
            declared_size: size as i64,
            declared_extension: extension,
            spool_path: spool_path.to_string_lossy().into_owned(),
        },
    )
    .await?;
    queue::enqueue(&state.db, job.job_id).await?;

    tracing::info!(
        job_id = %job.job_id,
        owner_id = %owner_id,
        filename = %filename,
        size,
        "Upload accepted and queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            job_id: job.job_id,
            filename,
            size,
            status: "queued",
        }),
    ))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/dashboard/upload", post(upload_file))
}
