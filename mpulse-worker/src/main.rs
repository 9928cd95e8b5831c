use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing_subscriber::EnvFilter;

use mpulse_common::config::Config;
use mpulse_common::db::init_database_pool;
use mpulse_common::queue;
use mpulse_worker::scorer::LexiconScorer;
use mpulse_worker::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::load()?);
    tracing::info!(
        database = %config.database.path.display(),
        concurrency = config.worker.concurrency,
        "Starting mpulse-worker"
    );

    let pool = init_database_pool(&config.database.path).await?;

    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        config.clone(),
        Arc::new(LexiconScorer::default()),
    ));

    let mut handles = Vec::new();
    for worker_index in 0..config.worker.concurrency.max(1) {
        let orchestrator = orchestrator.clone();
        let pool = pool.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            drain_loop(worker_index, pool, config, orchestrator).await;
        }));
    }
    handles.push(tokio::spawn(sweep_loop(pool, config)));

    for handle in handles {
        handle.await?;
    }
    Ok(())
}

/// Pull deliveries and drive each to a terminal outcome. Store errors
/// are logged and the loop keeps going; the staleness sweep redelivers
/// anything a crashed iteration dropped.
async fn drain_loop(
    worker_index: usize,
    pool: SqlitePool,
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator>,
) {
    let idle = Duration::from_millis(config.worker.poll_interval_ms);
    loop {
        match queue::dequeue(&pool).await {
            Ok(Some(job_id)) => {
                if let Err(e) = orchestrator.process(job_id).await {
                    tracing::error!(worker_index, job_id = %job_id, error = %e, "Job processing errored");
                }
            }
            Ok(None) => tokio::time::sleep(idle).await,
            Err(e) => {
                tracing::error!(worker_index, error = %e, "Queue dequeue failed");
                tokio::time::sleep(idle).await;
            }
        }
    }
}

/// Periodically re-enqueue jobs whose deliveries were lost: still
/// queued with no queue entry, or stuck in processing past the
/// staleness window.
async fn sweep_loop(pool: SqlitePool, config: Arc<Config>) {
    let interval = Duration::from_secs(config.worker.stale_after_secs.max(1) as u64);
    loop {
        tokio::time::sleep(interval).await;
        let cutoff = Utc::now() - chrono::Duration::seconds(config.worker.stale_after_secs);
        match queue::requeue_stale(&pool, cutoff).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(redelivered = n, "Requeued stale jobs"),
            Err(e) => tracing::error!(error = %e, "Stale-job sweep failed"),
        }
    }
}
