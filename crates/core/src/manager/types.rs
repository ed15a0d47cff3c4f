//! Types for the download manager.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;
use crate::job::JobStatus;
use crate::persistence::PersistenceError;
use crate::retry::RetryError;

/// Errors that can occur while managing jobs.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Operation not allowed in the job's current status.
    #[error("cannot {operation} job {id} while it is {status}")]
    InvalidState {
        id: String,
        status: JobStatus,
        operation: &'static str,
    },

    /// Request rejected before reaching the engine.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A retry was refused by the circuit breaker or ran out of attempts.
    #[error(transparent)]
    Retry(#[from] RetryError<EngineError>),

    /// Job engine error.
    #[error("job engine error: {0}")]
    Engine(#[from] EngineError),

    /// Persistence error.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Current status of the download manager.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerStatus {
    /// Whether the manager has been started and not shut down.
    pub running: bool,
    /// Name of the configured job engine, if any.
    pub engine: Option<String>,
    /// Total jobs in the table.
    pub jobs: usize,
    /// Jobs per status.
    pub by_status: BTreeMap<String, usize>,
    /// Jobs with updates waiting for the next flush.
    pub pending_updates: usize,
    /// Whether the table has changes not yet written to storage.
    pub dirty: bool,
    /// Last successful write to storage.
    pub last_saved_at: Option<DateTime<Utc>>,
}
