use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use mpulse_api::AppState;
use mpulse_common::config::Config;
use mpulse_common::db::init_database_pool;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::load()?);
    tracing::info!(
        database = %config.database.path.display(),
        spool = %config.upload.spool_dir.display(),
        "Starting mpulse-api"
    );

    tokio::fs::create_dir_all(&config.upload.spool_dir).await?;
    let pool = init_database_pool(&config.database.path).await?;

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let state = AppState::new(pool, config);
    let app = mpulse_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
