//! mpulse-worker library interface
//!
//! Exposes the pipeline stages for integration testing

pub mod alerts;
pub mod analysis;
pub mod orchestrator;
pub mod parser;
pub mod retry;
pub mod scorer;

pub use orchestrator::{JobOutcome, Orchestrator};
