//! Job engine abstraction.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::job::JobRecord;

/// Errors from a job engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Engine rejected request: {0}")]
    Rejected(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Body sent to the engine when a job is started.
#[derive(Debug, Clone, Serialize)]
pub struct StartJobRequest<'a> {
    pub id: &'a str,
    pub url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
}

impl<'a> From<&'a JobRecord> for StartJobRequest<'a> {
    fn from(job: &'a JobRecord) -> Self {
        Self {
            id: &job.id,
            url: &job.url,
            title: job.title.as_deref(),
        }
    }
}

/// The external engine that performs the actual transfers.
///
/// Progress comes back asynchronously as job updates; these calls only
/// start, restart or stop work.
#[async_trait]
pub trait JobEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Hand a newly submitted job to the engine.
    async fn start(&self, job: &JobRecord) -> Result<(), EngineError>;

    /// Restart a stopped or failed job.
    async fn retry(&self, job_id: &str) -> Result<(), EngineError>;

    /// Stop a job for good.
    async fn cancel(&self, job_id: &str) -> Result<(), EngineError>;
}
