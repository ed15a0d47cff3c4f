//! Authoritative in-memory job table.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use super::{JobRecord, JobStatus, JobUpdate};

/// Errors reported by a state sink when committing updates.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Updates referenced jobs that are not in the table.
    #[error("unknown job(s): {}", .0.join(", "))]
    UnknownJobs(Vec<String>),

    /// The sink cannot accept updates right now.
    #[error("state sink unavailable: {0}")]
    Unavailable(String),
}

/// Consumer of merged job updates.
///
/// Each call must be atomic per job id: a reader never observes half of an
/// update applied.
pub trait StateSink: Send + Sync {
    /// Commit one merged update.
    fn apply_update(&self, update: JobUpdate) -> Result<(), SinkError>;

    /// Commit several merged updates in one call.
    fn apply_batch(&self, updates: Vec<JobUpdate>) -> Result<(), SinkError>;
}

/// In-memory job table.
///
/// Every committed mutation bumps a revision counter published on a watch
/// channel, which is how the persistence scheduler learns about changes.
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
    revision: watch::Sender<u64>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            jobs: RwLock::new(HashMap::new()),
            revision,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobRecord>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobRecord>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Current mutation revision.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver that is notified after every committed mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Insert a newly submitted job, replacing any record with the same id.
    pub fn insert(&self, record: JobRecord) -> Option<JobRecord> {
        let previous = self.write().insert(record.id.clone(), record);
        self.bump();
        previous
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn remove(&self, id: &str) -> Option<JobRecord> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Replace the whole table (used when restoring from storage).
    pub fn replace_all(&self, records: Vec<JobRecord>) {
        let mut jobs = self.write();
        jobs.clear();
        for record in records {
            jobs.insert(record.id.clone(), record);
        }
        drop(jobs);
        self.bump();
    }

    /// Count one retry attempt for a job. Returns the new count.
    pub fn record_retry_attempt(&self, id: &str) -> Option<u32> {
        let mut jobs = self.write();
        let record = jobs.get_mut(id)?;
        record.retry_count += 1;
        record.updated_at = Utc::now();
        let count = record.retry_count;
        drop(jobs);
        self.bump();
        Some(count)
    }

    /// Number of jobs per status (statuses with no jobs are included as 0).
    pub fn count_by_status(&self) -> HashMap<JobStatus, usize> {
        let mut counts: HashMap<JobStatus, usize> =
            JobStatus::ALL.iter().map(|status| (*status, 0)).collect();
        for record in self.read().values() {
            *counts.entry(record.status).or_default() += 1;
        }
        counts
    }
}

impl StateSink for JobStore {
    fn apply_update(&self, update: JobUpdate) -> Result<(), SinkError> {
        let mut jobs = self.write();
        let Some(record) = jobs.get_mut(&update.id) else {
            return Err(SinkError::UnknownJobs(vec![update.id]));
        };
        record.apply(&update, Utc::now());
        drop(jobs);
        self.bump();
        Ok(())
    }

    fn apply_batch(&self, updates: Vec<JobUpdate>) -> Result<(), SinkError> {
        let now = Utc::now();
        let mut unknown = Vec::new();
        let mut applied = 0usize;

        let mut jobs = self.write();
        for update in updates {
            match jobs.get_mut(&update.id) {
                Some(record) => {
                    record.apply(&update, now);
                    applied += 1;
                }
                None => unknown.push(update.id),
            }
        }
        drop(jobs);

        if applied > 0 {
            self.bump();
        }
        debug!(applied, unknown = unknown.len(), "Applied job update batch");

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(SinkError::UnknownJobs(unknown))
        }
    }
}
