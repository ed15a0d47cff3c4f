//! Dirty tracking and adaptive save scheduling for the job collection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::job::{JobRecord, JobStore};
use crate::metrics::{LOAD_DISCARDED, PERSISTENCE_WRITES, PERSISTENCE_WRITE_DURATION};
use crate::timer::DelayedTask;

use super::backend::StorageBackend;
use super::config::PersistenceConfig;
use super::types::{PersistedJobs, PersistenceError};

struct DirtyTracker {
    dirty: bool,
    /// Store revision captured by the last successful write.
    saved_revision: u64,
    last_saved_at: Instant,
    last_saved_wall: Option<DateTime<Utc>>,
    timer: DelayedTask,
}

struct Inner {
    config: PersistenceConfig,
    key: String,
    store: Arc<JobStore>,
    backend: Arc<dyn StorageBackend>,
    tracker: Mutex<DirtyTracker>,
    /// Serializes writes so payloads land in snapshot order.
    write_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, DirtyTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn compute_delay(&self, tracker: &DirtyTracker, now: Instant) -> Duration {
        let since_save = now.saturating_duration_since(tracker.last_saved_at);
        let staleness_left = self.config.max_staleness().saturating_sub(since_save);
        self.config.save_interval().min(staleness_left)
    }

    fn schedule(self: &Arc<Self>, tracker: &mut DirtyTracker, delay: Duration) {
        let weak = Arc::downgrade(self);
        tracker.timer.schedule(delay, save_later(weak));
        debug!(delay_ms = delay.as_millis() as u64, "Scheduled job collection save");
    }

    fn on_mutation(self: &Arc<Self>) {
        let mut tracker = self.lock();
        if tracker.dirty {
            return;
        }
        tracker.dirty = true;
        let delay = self.compute_delay(&tracker, Instant::now());
        self.schedule(&mut tracker, delay);
    }

    async fn save_now(self: &Arc<Self>) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;

        let revision = self.store.revision();
        let payload = PersistedJobs::new(self.store.list(), Utc::now());
        let serialized = match serde_json::to_string(&payload) {
            Ok(s) => s,
            Err(e) => {
                PERSISTENCE_WRITES.with_label_values(&["failure"]).inc();
                self.retry_later();
                return Err(e.into());
            }
        };

        let started = std::time::Instant::now();
        let result = self.backend.write(&self.key, &serialized).await;
        PERSISTENCE_WRITE_DURATION.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                PERSISTENCE_WRITES.with_label_values(&["success"]).inc();
                let mut tracker = self.lock();
                tracker.last_saved_at = Instant::now();
                tracker.last_saved_wall = Some(Utc::now());
                tracker.saved_revision = revision;
                if self.store.revision() == revision {
                    tracker.dirty = false;
                    tracker.timer.cancel();
                } else if !tracker.timer.is_pending() {
                    // Mutated while writing: stay dirty and go again.
                    let delay = self.compute_delay(&tracker, Instant::now());
                    self.schedule(&mut tracker, delay);
                }
                debug!(jobs = payload.items.len(), "Saved job collection");
                Ok(())
            }
            Err(e) => {
                PERSISTENCE_WRITES.with_label_values(&["failure"]).inc();
                warn!(
                    backend = self.backend.name(),
                    "Failed to save job collection: {}", e
                );
                self.retry_later();
                Err(e.into())
            }
        }
    }

    fn retry_later(self: &Arc<Self>) {
        let mut tracker = self.lock();
        tracker.dirty = true;
        if !tracker.timer.is_pending() {
            let delay = self.config.save_interval();
            self.schedule(&mut tracker, delay);
        }
    }
}

async fn save_later(inner: Weak<Inner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    inner.lock().timer.detach();
    // Failures are logged and rescheduled inside save_now.
    let _ = inner.save_now().await;
}

/// Keeps the durable copy of the job table fresh.
///
/// A mutation marks the collection dirty and schedules a write after
/// `min(save_interval, max_staleness - time_since_last_save)`, so bursts
/// produce one write per interval while no change stays unsaved for longer
/// than the staleness bound. Failed writes leave the collection dirty and are
/// tried again after one save interval.
#[derive(Clone)]
pub struct PersistenceScheduler {
    inner: Arc<Inner>,
}

impl PersistenceScheduler {
    pub fn new(
        config: PersistenceConfig,
        key: impl Into<String>,
        store: Arc<JobStore>,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        let saved_revision = store.revision();
        Self {
            inner: Arc::new(Inner {
                config,
                key: key.into(),
                store,
                backend,
                tracker: Mutex::new(DirtyTracker {
                    dirty: false,
                    saved_revision,
                    last_saved_at: Instant::now(),
                    last_saved_wall: None,
                    timer: DelayedTask::new(),
                }),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Record that the job table changed.
    ///
    /// Schedules a write if the collection was clean; otherwise the pending
    /// write will pick the change up.
    pub fn on_mutation(&self) {
        self.inner.on_mutation();
    }

    /// Delay a write scheduled at `now` would wait.
    pub fn compute_delay(&self, now: Instant) -> Duration {
        let tracker = self.inner.lock();
        self.inner.compute_delay(&tracker, now)
    }

    /// Write the collection right away, regardless of the dirty flag.
    pub async fn save_now(&self) -> Result<(), PersistenceError> {
        self.inner.save_now().await
    }

    /// Cancel any scheduled write and perform it now if the table changed
    /// since the last write, even if no mutation was reported yet.
    pub async fn save_if_dirty(&self) -> Result<(), PersistenceError> {
        let dirty = {
            let mut tracker = self.inner.lock();
            tracker.timer.cancel();
            tracker.dirty || tracker.saved_revision != self.inner.store.revision()
        };
        if dirty {
            self.inner.save_now().await
        } else {
            Ok(())
        }
    }

    /// Declare the current table contents identical to what is stored.
    ///
    /// Called after installing a freshly loaded collection.
    pub fn mark_synced(&self) {
        let mut tracker = self.inner.lock();
        tracker.saved_revision = self.inner.store.revision();
        tracker.dirty = false;
        tracker.timer.cancel();
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Wall-clock time of the last successful write.
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_saved_wall
    }

    /// Whether a write is currently scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.inner.lock().timer.is_pending()
    }

    /// Read the stored collection, dropping expired and unreadable entries.
    ///
    /// Never fails: read errors and malformed payloads are logged and yield
    /// an empty collection.
    pub async fn load_from_storage(&self) -> Vec<JobRecord> {
        let inner = &self.inner;
        inner.lock().last_saved_at = Instant::now();

        let raw = match inner.backend.read(&inner.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!(key = %inner.key, "No stored job collection");
                return Vec::new();
            }
            Err(e) => {
                warn!(backend = inner.backend.name(), "Failed to read job collection: {}", e);
                return Vec::new();
            }
        };

        match decode_payload(&raw, inner.config.retention(), Utc::now()) {
            Ok(jobs) => {
                info!(jobs = jobs.len(), "Loaded job collection");
                jobs
            }
            Err(e) => {
                warn!("Discarding stored job collection: {}", e);
                Vec::new()
            }
        }
    }

    /// Feed every committed mutation of `store` into this scheduler.
    ///
    /// The task ends when the scheduler is dropped or the handle is aborted.
    pub fn spawn_watcher(&self) -> JoinHandle<()> {
        let mut changes = self.inner.store.subscribe();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                match weak.upgrade() {
                    Some(inner) => inner.on_mutation(),
                    None => break,
                }
            }
            debug!("Persistence watcher stopped");
        })
    }
}

/// Parse a stored payload and apply retention.
///
/// Terminal jobs whose completion (or, lacking one, creation) is older than
/// `retention` are dropped, as are items that do not parse as job records.
pub fn decode_payload(
    raw: &str,
    retention: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<Vec<JobRecord>, PersistenceError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| PersistenceError::Malformed(e.to_string()))?;
    let items = value
        .get("items")
        .and_then(|items| items.as_array())
        .ok_or_else(|| PersistenceError::Malformed("missing items array".to_string()))?;

    let cutoff = now - retention;
    let mut jobs = Vec::with_capacity(items.len());
    for item in items {
        let job: JobRecord = match serde_json::from_value(item.clone()) {
            Ok(job) => job,
            Err(e) => {
                LOAD_DISCARDED.with_label_values(&["invalid"]).inc();
                warn!("Skipping unreadable stored job: {}", e);
                continue;
            }
        };
        if job.status.is_terminal() && job.completed_at.unwrap_or(job.created_at) < cutoff {
            LOAD_DISCARDED.with_label_values(&["expired"]).inc();
            debug!(job_id = %job.id, "Dropping expired job");
            continue;
        }
        jobs.push(job);
    }
    Ok(jobs)
}
