//! Job record and partial update types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for the engine to pick it up.
    Queued,
    /// Transferring data.
    Downloading,
    /// Post-processing (muxing, tagging) after the transfer.
    Processing,
    /// Stopped by the user or interrupted by a restart.
    Paused,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped by the user for good.
    Cancelled,
}

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Queued,
        JobStatus::Downloading,
        JobStatus::Processing,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Statuses in which the engine is producing telemetry.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Downloading | JobStatus::Processing)
    }

    /// Statuses after which the job is logically retired.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Statuses that carry an error description.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed)
    }

    /// Statuses from which a manual retry is allowed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Cancelled | JobStatus::Paused
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to submit a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Source URL handed to the engine.
    pub url: String,
    /// Optional display title.
    #[serde(default)]
    pub title: Option<String>,
}

/// One tracked download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: JobStatus,
    /// Percentage, 0-100.
    #[serde(default)]
    pub progress: f64,
    /// Transfer rate in bytes per second.
    #[serde(default)]
    pub rate: f64,
    /// Estimated seconds remaining.
    #[serde(default)]
    pub eta: u64,
    #[serde(default)]
    pub bytes_done: u64,
    #[serde(default)]
    pub bytes_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the job entered its current terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a queued record with a fresh id.
    pub fn new(job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: job.url,
            title: job.title,
            status: JobStatus::Queued,
            progress: 0.0,
            rate: 0.0,
            eta: 0,
            bytes_done: 0,
            bytes_total: 0,
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply a sparse update, then restore the record invariants.
    pub fn apply(&mut self, update: &JobUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            if status != self.status {
                self.completed_at = status.is_terminal().then_some(now);
            }
            self.status = status;
        }
        if let Some(progress) = update.progress.filter(|p| p.is_finite()) {
            self.progress = progress.clamp(0.0, 100.0);
        }
        if let Some(rate) = update.rate.filter(|r| r.is_finite()) {
            self.rate = rate.max(0.0);
        }
        if let Some(eta) = update.eta {
            self.eta = eta;
        }
        if let Some(total) = update.bytes_total {
            self.bytes_total = total;
        }
        if let Some(done) = update.bytes_done {
            self.bytes_done = done;
        }
        if let Some(error) = &update.error {
            self.error = error.clone();
        }

        if self.bytes_total > 0 && self.bytes_done > self.bytes_total {
            self.bytes_done = self.bytes_total;
        }
        if self.status == JobStatus::Completed {
            self.progress = 100.0;
            self.rate = 0.0;
            self.eta = 0;
        }
        if !self.status.is_failure() {
            self.error = None;
        }
        self.updated_at = now;
    }
}

/// Sparse, not-yet-committed mutation of one job.
///
/// `None` means "field absent". For `error`, `Some(None)` explicitly clears
/// the stored message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_done: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub error: Option<Option<String>>,
}

/// Distinguish `"error": null` (clear) from a missing key (absent).
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl JobUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn eta(mut self, eta: u64) -> Self {
        self.eta = Some(eta);
        self
    }

    pub fn bytes(mut self, done: u64, total: u64) -> Self {
        self.bytes_done = Some(done);
        self.bytes_total = Some(total);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    /// Whether this update moves the job to another lifecycle state.
    pub fn is_status_change(&self) -> bool {
        self.status.is_some()
    }

    /// Whether no field is present.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.rate.is_none()
            && self.eta.is_none()
            && self.bytes_done.is_none()
            && self.bytes_total.is_none()
            && self.error.is_none()
    }

    /// Overlay `newer` onto `self`: present fields win, absent fields keep
    /// whatever was already pending.
    pub fn merge(&mut self, newer: JobUpdate) {
        if newer.status.is_some() {
            self.status = newer.status;
        }
        if newer.progress.is_some() {
            self.progress = newer.progress;
        }
        if newer.rate.is_some() {
            self.rate = newer.rate;
        }
        if newer.eta.is_some() {
            self.eta = newer.eta;
        }
        if newer.bytes_done.is_some() {
            self.bytes_done = newer.bytes_done;
        }
        if newer.bytes_total.is_some() {
            self.bytes_total = newer.bytes_total;
        }
        if newer.error.is_some() {
            self.error = newer.error;
        }
    }
}
