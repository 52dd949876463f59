//! Backup and restore for the property-manager PostgreSQL database.
//!
//! [`jobs::Orchestrator`] runs each backup or restore on a worker thread:
//! first through the external client tools, then through a plain SQL
//! export or replay when a tool is missing or fails. Callers watch a
//! [`jobs::JobHandle`] for progress and the terminal result.

pub mod backup;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod jobs;
pub mod restore;
pub mod runner;
pub mod utils;

pub use config::{AppConfig, DbConfig};
pub use errors::{AppError, Result};
pub use jobs::{JobEvent, JobHandle, JobSummary, Orchestrator, Phase, Strategy};
