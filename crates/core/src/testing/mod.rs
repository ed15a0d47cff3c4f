//! Testing utilities and mock implementations.
//!
//! This module provides in-memory stand-ins for the state sink, the storage
//! backend and the job engine, so the coordinators and the download manager
//! can be exercised without real infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use dlsync_core::testing::{MemoryStorage, MockJobEngine};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let engine = Arc::new(MockJobEngine::new());
//!
//! // Engine rejects the first two calls
//! engine.fail_times(2).await;
//!
//! // Use in DownloadManager::new(...)
//! ```

mod memory_storage;
mod mock_job_engine;
mod recording_sink;

pub use memory_storage::MemoryStorage;
pub use mock_job_engine::{EngineCall, MockJobEngine, RecordedEngineCall};
pub use recording_sink::{Commit, RecordingSink};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{Duration, Utc};

    use crate::job::{JobRecord, JobStatus, NewJob};

    /// Create a queued job for `url`.
    pub fn job(url: &str) -> JobRecord {
        JobRecord::new(NewJob {
            url: url.to_string(),
            title: None,
        })
    }

    /// Create a job in `status`, with telemetry consistent with it.
    pub fn job_with_status(url: &str, status: JobStatus) -> JobRecord {
        let mut job = job(url);
        job.status = status;
        match status {
            JobStatus::Downloading | JobStatus::Processing | JobStatus::Paused => {
                job.progress = 42.0;
                job.bytes_done = 420;
                job.bytes_total = 1000;
            }
            JobStatus::Completed => {
                job.progress = 100.0;
                job.bytes_done = 1000;
                job.bytes_total = 1000;
                job.completed_at = Some(Utc::now());
            }
            JobStatus::Failed => {
                job.error = Some("connection reset".to_string());
                job.completed_at = Some(Utc::now());
            }
            JobStatus::Cancelled => {
                job.completed_at = Some(Utc::now());
            }
            JobStatus::Queued => {}
        }
        job
    }

    /// Create a completed job that finished `days` days ago.
    pub fn completed_days_ago(url: &str, days: i64) -> JobRecord {
        let mut job = job_with_status(url, JobStatus::Completed);
        let finished = Utc::now() - Duration::days(days);
        job.created_at = finished - Duration::hours(1);
        job.updated_at = finished;
        job.completed_at = Some(finished);
        job
    }
}
