//! Ingestion orchestrator
//!
//! Owns the job lifecycle state machine
//! `queued -> processing -> {completed | failed}` for one delivery.
//! The first action is always the claim CAS; a Conflict there means
//! another worker owns the job (or it is already terminal) and this
//! delivery is abandoned with no side effects. Persisting results and
//! the `completed` transition are one transaction in the job store, so
//! a crash in between leaves the job observably stuck in `processing`
//! for the staleness sweep to redeliver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use mpulse_common::config::Config;
use mpulse_common::db::jobs::{self, ClaimOutcome, TableMeta, TransitionOutcome};
use mpulse_common::db::{alerts as alert_store, sentiments as sentiment_store};
use mpulse_common::models::UploadJob;
use mpulse_common::validate::FileValidator;
use mpulse_common::Result;

use crate::alerts::AlertEvaluator;
use crate::analysis::{AnalysisEngine, AnalysisResult};
use crate::parser;
use crate::retry::retry_with_backoff;
use crate::scorer::TextScorer;

/// Caller-safe reason for scoring-infrastructure failures; internals
/// stay in the logs
const ANALYSIS_UNAVAILABLE_REASON: &str = "Analysis temporarily unavailable";

/// How one delivery ended, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// Claim or final transition conflicted: another worker owns the
    /// job or already finished it. No side effects.
    Abandoned,
}

/// Per-worker orchestrator; composes validator, parser, analysis
/// engine, and alert evaluator over the shared job store
pub struct Orchestrator {
    db: SqlitePool,
    config: Arc<Config>,
    validator: FileValidator,
    engine: AnalysisEngine,
    evaluator: AlertEvaluator,
}

impl Orchestrator {
    pub fn new(db: SqlitePool, config: Arc<Config>, scorer: Arc<dyn TextScorer>) -> Self {
        let validator = FileValidator::new(config.upload.max_file_bytes);
        let engine = AnalysisEngine::new(scorer, config.scoring.clone());
        let evaluator = AlertEvaluator::new(config.alerts.clone());
        Self {
            db,
            config,
            validator,
            engine,
            evaluator,
        }
    }

    /// Process one queue delivery to a terminal outcome.
    ///
    /// Idempotent with respect to redelivery: a job already terminal or
    /// freshly owned by another worker is abandoned at the claim.
    pub async fn process(&self, job_id: Uuid) -> Result<JobOutcome> {
        let stale_cutoff = Utc::now() - chrono::Duration::seconds(self.config.worker.stale_after_secs);

        let attempt = match jobs::claim(&self.db, job_id, stale_cutoff).await? {
            ClaimOutcome::Claimed { attempt } => attempt,
            ClaimOutcome::Conflict => {
                tracing::debug!(job_id = %job_id, "Claim conflict, abandoning delivery");
                return Ok(JobOutcome::Abandoned);
            }
        };

        let Some(job) = jobs::get(&self.db, job_id).await? else {
            tracing::error!(job_id = %job_id, "Claimed job vanished from the store");
            return Ok(JobOutcome::Abandoned);
        };

        tracing::info!(
            job_id = %job_id,
            attempt,
            filename = %job.original_filename,
            "Processing upload job"
        );

        match self.run_pipeline(&job).await {
            Ok((meta, result)) => self.finish_completed(&job, attempt, meta, result).await,
            Err(reason) => self.finish_failed(&job, attempt, &reason).await,
        }
    }

    /// Validate, parse, and analyze the spooled bytes.
    ///
    /// Returns a caller-safe failure reason on the error path; full
    /// details go to the log here.
    async fn run_pipeline(&self, job: &UploadJob) -> std::result::Result<(TableMeta, AnalysisResult), String> {
        let bytes = match tokio::fs::read(&job.spool_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "Spooled upload is unreadable");
                return Err("Uploaded file is no longer available".to_string());
            }
        };

        // The upload endpoint already validated; re-check defensively
        // since the spool sat on disk between the two processes
        if let Err(e) = self.validator.validate(
            &job.original_filename,
            job.declared_size.max(0) as u64,
            &bytes,
        ) {
            return Err(e.to_string());
        }

        // Parse errors are deterministic on the same input: never retried
        let table = parser::parse(&bytes, &job.declared_extension).map_err(|e| e.to_string())?;

        let meta = TableMeta {
            row_count: table.row_count() as i64,
            column_count: table.column_count() as i64,
            headers: table.headers().to_vec(),
        };

        // Only scoring-infrastructure failures are transient; bounded
        // retries with exponential backoff before giving up
        let collected_at = Utc::now();
        let result = retry_with_backoff(
            "analysis",
            self.config.worker.analysis_max_attempts,
            Duration::from_millis(self.config.worker.analysis_backoff_ms),
            || async { self.engine.analyze(&table, job.owner_id, collected_at) },
        )
        .await
        .map_err(|e| {
            tracing::error!(job_id = %job.job_id, error = %e, "Analysis failed after retries");
            ANALYSIS_UNAVAILABLE_REASON.to_string()
        })?;

        Ok((meta, result))
    }

    async fn finish_completed(
        &self,
        job: &UploadJob,
        attempt: i64,
        meta: TableMeta,
        result: AnalysisResult,
    ) -> Result<JobOutcome> {
        // Read keyword history before the new rows land, for the
        // sentiment-shift rule
        let mut previous_means = HashMap::new();
        for record in &result.sentiments {
            if let Some(mean) =
                sentiment_store::mean_for_keyword(&self.db, job.owner_id, &record.keyword).await?
            {
                previous_means.insert(record.keyword.clone(), mean);
            }
        }

        let outcome = jobs::complete(
            &self.db,
            job.job_id,
            attempt,
            &meta,
            &result.market_trends,
            &result.sentiments,
        )
        .await?;

        if outcome == TransitionOutcome::Conflict {
            tracing::info!(
                job_id = %job.job_id,
                attempt,
                "Completion fenced out; another worker finished this job"
            );
            return Ok(JobOutcome::Abandoned);
        }

        tracing::info!(
            job_id = %job.job_id,
            rows = meta.row_count,
            columns = meta.column_count,
            trend_points = result.market_trends.len(),
            sentiment_records = result.sentiments.len(),
            "Job completed"
        );

        // Alerts are advisory: failures here must not fail the job
        for alert in self.evaluator.evaluate(&result, &previous_means) {
            if let Err(e) = alert_store::insert(&self.db, &alert).await {
                tracing::warn!(job_id = %job.job_id, error = %e, "Failed to append alert");
            }
        }

        self.remove_spool(job).await;
        Ok(JobOutcome::Completed)
    }

    async fn finish_failed(&self, job: &UploadJob, attempt: i64, reason: &str) -> Result<JobOutcome> {
        let outcome = jobs::fail(&self.db, job.job_id, attempt, reason).await?;
        if outcome == TransitionOutcome::Conflict {
            tracing::info!(
                job_id = %job.job_id,
                attempt,
                "Failure transition fenced out; another worker owns this job"
            );
            return Ok(JobOutcome::Abandoned);
        }

        tracing::warn!(job_id = %job.job_id, reason, "Job failed");
        self.remove_spool(job).await;
        Ok(JobOutcome::Failed)
    }

    /// Spool cleanup on any terminal outcome. The job result matters
    /// more than the cleanup, so errors are only logged.
    async fn remove_spool(&self, job: &UploadJob) {
        match tokio::fs::remove_file(&job.spool_path).await {
            Ok(()) => tracing::debug!(job_id = %job.job_id, "Spool file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "Failed to remove spool file")
            }
        }
    }
}
