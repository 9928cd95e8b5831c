//! HTTP API route handlers

pub mod health;
pub mod insights;
pub mod jobs;
pub mod upload;

pub use health::health_routes;
pub use insights::insight_routes;
pub use jobs::job_routes;
pub use upload::upload_routes;
