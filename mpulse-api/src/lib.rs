//! mpulse-api library interface
//!
//! Exposes the router and application state for integration testing.

pub mod api;
pub mod error;
pub mod extract;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use mpulse_common::config::Config;
use mpulse_common::validate::FileValidator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Shared SQLite connection pool
    pub db: SqlitePool,
    pub config: Arc<Config>,
    /// Upload acceptance checks (size, extension, content sniffing)
    pub validator: FileValidator,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Arc<Config>) -> Self {
        let validator = FileValidator::new(config.upload.max_file_bytes);
        Self {
            db,
            config,
            validator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    // Leave headroom above the file limit for multipart framing; the
    // validator still enforces the exact per-file limit
    let body_limit = state.config.upload.max_file_bytes as usize + 64 * 1024;

    Router::new()
        .merge(api::upload_routes())
        .merge(api::job_routes())
        .merge(api::insight_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
