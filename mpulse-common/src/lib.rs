//! # MarketPulse Common Library
//!
//! Shared code for the MarketPulse ingestion pipeline services including:
//! - Data models (upload jobs, trend points, sentiment records, alerts)
//! - Job store and job queue (SQLite-backed)
//! - Upload file validation
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod queue;
pub mod validate;

pub use error::{Error, Result};
