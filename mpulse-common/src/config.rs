//! Configuration loading
//!
//! Resolution priority, highest first:
//! 1. Environment variables (`MPULSE_*`)
//! 2. TOML config file (`MPULSE_CONFIG` path, else `mpulse.toml` in cwd)
//! 3. Compiled defaults
//!
//! Policy knobs (upload limits, retry bounds, scoring weights, alert
//! thresholds) live here rather than being hard-coded at call sites.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
    pub api: ApiConfig,
    pub worker: WorkerConfig,
    pub scoring: ScoringConfig,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the shared SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mpulse.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes
    pub max_file_bytes: u64,
    /// Directory where accepted uploads await the worker
    pub spool_dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024, // 10 MB
            spool_dir: PathBuf::from("spool"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5810,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent drain loops
    pub concurrency: usize,
    /// Queue poll interval when empty, in milliseconds
    pub poll_interval_ms: u64,
    /// A `processing` job older than this is considered abandoned and
    /// becomes eligible for redelivery
    pub stale_after_secs: i64,
    /// Maximum scoring attempts before the job is failed
    pub analysis_max_attempts: u32,
    /// Initial backoff between scoring attempts, in milliseconds
    /// (doubles each attempt)
    pub analysis_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval_ms: 500,
            stale_after_secs: 300,
            analysis_max_attempts: 3,
            analysis_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum average whitespace tokens per cell for a column to be
    /// treated as free text
    pub min_avg_tokens: f64,
    /// Weight applied to a keyword's normalized mention frequency when
    /// deriving its trend score
    pub frequency_weight: f64,
    /// Additional weight per mention, rewarding recurring keywords
    pub momentum_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_avg_tokens: 2.0,
            frequency_weight: 100.0,
            momentum_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Absolute sentiment swing versus the stored mean that raises a
    /// `sentiment_shift` alert
    pub sentiment_shift_threshold: f64,
    /// Trend score above which a `trend_spike` alert is raised
    pub trend_spike_threshold: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sentiment_shift_threshold: 0.5,
            trend_spike_threshold: 75.0,
        }
    }
}

impl Config {
    /// Load configuration following the documented priority order
    pub fn load() -> Result<Config> {
        let path = std::env::var("MPULSE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("mpulse.toml"));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Environment variables take priority over file values
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MPULSE_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("MPULSE_SPOOL_DIR") {
            self.upload.spool_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("MPULSE_API_PORT") {
            if let Ok(port) = port.parse() {
                self.api.port = port;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.upload.max_file_bytes, 10 * 1024 * 1024);
        assert!(config.worker.analysis_max_attempts >= 1);
        assert!(config.worker.stale_after_secs > 0);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [upload]
            max_file_bytes = 1024

            [worker]
            concurrency = 4
            "#,
        )
        .unwrap();
        assert_eq!(parsed.upload.max_file_bytes, 1024);
        assert_eq!(parsed.worker.concurrency, 4);
        // Untouched sections keep compiled defaults
        assert_eq!(parsed.api.port, 5810);
        assert_eq!(parsed.scoring.min_avg_tokens, 2.0);
    }
}
