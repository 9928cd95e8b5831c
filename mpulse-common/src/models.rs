//! Data models for the ingestion pipeline
//!
//! Job lifecycle: `queued → processing → {completed | failed}`.
//! Terminal states absorb; a job row is never mutated after reaching one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upload job status
///
/// A closed enumeration rather than a free-form string, so illegal
/// states are unrepresentable. Ordering of the lifecycle is encoded in
/// [`JobStatus::rank`]; transitions only ever move to a higher rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and waiting in the job queue
    Queued,
    /// Claimed by a worker, parse/analysis in flight
    Processing,
    /// Parse and analysis succeeded, results persisted
    Completed,
    /// Terminal failure; `error_reason` is populated
    Failed,
}

impl JobStatus {
    /// Stable string form used in the database and API responses
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse the database string form
    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Position in the lifecycle order `queued < processing < {completed, failed}`
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether no further transition can occur from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving to `next` is a legal forward transition
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,
            _ => false,
        }
    }

    /// Coarse advisory progress percentage for polling clients.
    ///
    /// Derived from status alone, not from row-level progress; clients
    /// must treat it as cosmetic.
    pub fn progress_hint(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 50,
            JobStatus::Completed | JobStatus::Failed => 100,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// One unit of asynchronous work corresponding to one uploaded file
#[derive(Debug, Clone, Serialize)]
pub struct UploadJob {
    /// Unique job identifier, assigned at acceptance, never reused
    pub job_id: Uuid,
    /// Identity of the requesting user; scopes all derived results
    pub owner_id: Uuid,
    /// Filename as supplied by the client
    pub original_filename: String,
    /// File size in bytes as observed at acceptance
    pub declared_size: i64,
    /// Lowercased extension as supplied by the client (e.g. "csv")
    pub declared_extension: String,
    /// Location of the raw bytes awaiting the worker
    pub spool_path: String,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Claim fencing token; incremented each time a worker claims the job
    pub attempt: i64,
    /// Populated iff parsing succeeded
    pub row_count: Option<i64>,
    /// Populated iff parsing succeeded
    pub column_count: Option<i64>,
    /// Ordered column headers; populated iff parsing succeeded
    pub headers: Option<Vec<String>>,
    /// Caller-safe failure cause; populated iff status is `failed`
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Changes on every status transition
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new upload job
#[derive(Debug, Clone)]
pub struct NewUploadJob {
    pub owner_id: Uuid,
    pub original_filename: String,
    pub declared_size: i64,
    pub declared_extension: String,
    pub spool_path: String,
}

/// Derived per-keyword trend measurement
///
/// Rows accumulate across uploads to support time-series trend charts;
/// ownership is by `owner_id`, not by job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketTrendPoint {
    pub owner_id: Uuid,
    pub keyword: String,
    /// Recency-weighted prominence measure; higher is more prominent
    pub trend_score: f64,
    pub collected_at: DateTime<Utc>,
}

/// Derived per-keyword sentiment aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub owner_id: Uuid,
    pub keyword: String,
    /// Mean sentiment over the keyword's mentions, bounded -1.0..1.0
    pub sentiment_score: f64,
    pub mention_count: i64,
    pub collected_at: DateTime<Utc>,
}

/// Dashboard alert produced by the rule evaluator
///
/// Alerts are append-only; the only permitted mutation is the `is_read`
/// flag, set by the owning user.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: i64,
    pub owner_id: Uuid,
    pub alert_type: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
}

/// Data required to append a new alert
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub owner_id: Uuid,
    pub alert_type: String,
    pub message: String,
}
