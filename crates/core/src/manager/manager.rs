//! Download manager implementation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::UpdateAggregator;
use crate::config::Config;
use crate::engine::{EngineError, JobEngine};
use crate::job::{JobRecord, JobStatus, JobStore, JobUpdate, NewJob, StateSink};
use crate::persistence::{PersistenceScheduler, StorageBackend};
use crate::retry::{RetryCoordinator, RetryError, RetryHooks, RetryStats};

use super::types::{ManagerError, ManagerStatus};

/// Owns the job table and everything that keeps it current and durable.
///
/// Engine events go through [`ingest`](Self::ingest) into the aggregator;
/// user actions (submit, retry, cancel, remove) act on the engine and report
/// their outcome through the same aggregator, so every change reaches the
/// store the same way and is picked up by the persistence scheduler.
pub struct DownloadManager {
    store: Arc<JobStore>,
    aggregator: UpdateAggregator,
    retry: RetryCoordinator,
    persistence: PersistenceScheduler,
    engine: Option<Arc<dyn JobEngine>>,

    // Runtime state
    running: AtomicBool,
    /// Jobs with a retry loop currently running.
    retrying: Mutex<HashSet<String>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadManager {
    /// Create a new manager. Nothing is loaded until [`start`](Self::start).
    pub fn new(
        config: &Config,
        backend: Arc<dyn StorageBackend>,
        engine: Option<Arc<dyn JobEngine>>,
    ) -> Self {
        let store = Arc::new(JobStore::new());
        let aggregator = UpdateAggregator::new(
            config.aggregator.clone(),
            Arc::clone(&store) as Arc<dyn StateSink>,
        );
        let persistence = PersistenceScheduler::new(
            config.persistence.clone(),
            config.storage.key.clone(),
            Arc::clone(&store),
            backend,
        );

        Self {
            store,
            aggregator,
            retry: RetryCoordinator::new(config.retry.clone()),
            persistence,
            engine,
            running: AtomicBool::new(false),
            retrying: Mutex::new(HashSet::new()),
            watcher: Mutex::new(None),
        }
    }

    /// Restore the stored job collection and start tracking changes.
    ///
    /// Jobs that were downloading or processing when the process stopped come
    /// back as paused, since the engine no longer reports on them.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Download manager already running");
            return;
        }

        info!("Starting download manager");

        let now = Utc::now();
        let mut jobs = self.persistence.load_from_storage().await;
        let mut interrupted = 0usize;
        for job in jobs.iter_mut().filter(|job| job.status.is_active()) {
            let update = JobUpdate::new(job.id.clone())
                .status(JobStatus::Paused)
                .rate(0.0)
                .eta(0);
            job.apply(&update, now);
            interrupted += 1;
        }

        let restored = jobs.len();
        self.store.replace_all(jobs);
        self.persistence.mark_synced();
        if interrupted > 0 {
            info!(interrupted, "Paused jobs interrupted by restart");
            self.persistence.on_mutation();
        }

        let watcher = self.persistence.spawn_watcher();
        if let Some(old) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(watcher)
        {
            old.abort();
        }

        info!(restored, "Download manager started");
    }

    /// Commit pending updates, stop tracking and write outstanding changes.
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Download manager not running");
            return Ok(());
        }

        info!("Stopping download manager");

        self.aggregator.flush_immediately();
        if let Some(watcher) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.abort();
        }
        self.persistence.save_if_dirty().await?;

        info!("Download manager stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Create a queued job and hand it to the engine.
    ///
    /// An engine rejection does not fail the call: the job is kept and marked
    /// failed with the engine's message so it can be retried.
    pub async fn submit(&self, request: NewJob) -> Result<JobRecord, ManagerError> {
        if request.url.trim().is_empty() {
            return Err(ManagerError::InvalidRequest(
                "url must not be empty".to_string(),
            ));
        }

        let job = JobRecord::new(request);
        let id = job.id.clone();
        self.store.insert(job.clone());
        info!(job_id = %id, url = %job.url, "Job submitted");

        if let Some(engine) = &self.engine {
            if let Err(e) = engine.start(&job).await {
                warn!(job_id = %id, engine = engine.name(), "Engine rejected job: {}", e);
                self.aggregator.queue_update(
                    JobUpdate::new(id.clone())
                        .status(JobStatus::Failed)
                        .error(e.to_string()),
                );
            }
        }

        self.get(&id).ok_or(ManagerError::JobNotFound(id))
    }

    /// Forward an engine progress event. Never blocks on the store.
    pub fn ingest(&self, update: JobUpdate) {
        self.aggregator.queue_update(update);
    }

    /// Forward several engine progress events, in order.
    pub fn ingest_batch(&self, updates: Vec<JobUpdate>) {
        for update in updates {
            self.aggregator.queue_update(update);
        }
    }

    /// Restart a failed, cancelled or paused job through the retry coordinator.
    ///
    /// On success the job is queued again with its error cleared. When the
    /// retry is refused or runs out of attempts the job is marked failed with
    /// a message for the user and the typed error is returned.
    pub async fn retry(&self, id: &str) -> Result<JobRecord, ManagerError> {
        let job = self.require(id)?;
        if !job.status.is_retryable() {
            return Err(ManagerError::InvalidState {
                id: id.to_string(),
                status: job.status,
                operation: "retry",
            });
        }
        let _in_flight = RetryInFlight::acquire(&self.retrying, id).ok_or_else(|| {
            debug!(job_id = id, "Retry already in progress");
            ManagerError::InvalidState {
                id: id.to_string(),
                status: job.status,
                operation: "retry",
            }
        })?;

        let store = &self.store;
        let engine = self.engine.clone();
        let hooks = RetryHooks::new().on_retry(|attempt, delay| {
            info!(
                job_id = id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Scheduling job retry"
            );
        });

        let result = self
            .retry
            .execute_with_retry(
                id,
                || {
                    store.record_retry_attempt(id);
                    let engine = engine.clone();
                    let id = id.to_string();
                    async move {
                        match engine {
                            Some(engine) => engine.retry(&id).await,
                            None => Ok::<(), EngineError>(()),
                        }
                    }
                },
                hooks,
            )
            .await;

        match result {
            Ok(()) => {
                info!(job_id = id, "Job retry accepted");
                self.aggregator.queue_update(
                    JobUpdate::new(id)
                        .status(JobStatus::Queued)
                        .clear_error(),
                );
                self.require(id)
            }
            Err(e) => {
                let message = retry_failure_message(&e);
                warn!(job_id = id, "Job retry failed: {}", e);
                self.aggregator.queue_update(
                    JobUpdate::new(id)
                        .status(JobStatus::Failed)
                        .error(message),
                );
                Err(ManagerError::Retry(e))
            }
        }
    }

    /// Stop a job that has not finished yet.
    pub async fn cancel(&self, id: &str) -> Result<JobRecord, ManagerError> {
        let job = self.require(id)?;
        if job.status.is_terminal() {
            return Err(ManagerError::InvalidState {
                id: id.to_string(),
                status: job.status,
                operation: "cancel",
            });
        }

        if let Some(engine) = &self.engine {
            engine.cancel(id).await?;
        }

        self.aggregator
            .queue_update(JobUpdate::new(id).status(JobStatus::Cancelled));
        info!(job_id = id, "Job cancelled");
        self.require(id)
    }

    /// Delete a job and forget its retry history.
    ///
    /// Unfinished jobs are cancelled on the engine first; a failure to do so
    /// is logged and does not prevent the removal.
    pub async fn remove(&self, id: &str) -> Result<JobRecord, ManagerError> {
        let job = self.require(id)?;

        if !job.status.is_terminal() {
            if let Some(engine) = &self.engine {
                if let Err(e) = engine.cancel(id).await {
                    warn!(job_id = id, "Failed to cancel job before removal: {}", e);
                }
            }
        }

        let removed = self
            .store
            .remove(id)
            .ok_or_else(|| ManagerError::JobNotFound(id.to_string()))?;
        self.retry.reset_retry_state(id);
        info!(job_id = id, "Job removed");
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.store.get(id)
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        self.store.list()
    }

    /// Retry and circuit breaker state for a job.
    pub fn retry_stats(&self, id: &str) -> Result<RetryStats, ManagerError> {
        self.require(id)?;
        Ok(self.retry.get_retry_stats(id))
    }

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            running: self.is_running(),
            engine: self.engine.as_ref().map(|e| e.name().to_string()),
            jobs: self.store.len(),
            by_status: self
                .store
                .count_by_status()
                .into_iter()
                .map(|(status, count)| (status.to_string(), count))
                .collect(),
            pending_updates: self.aggregator.pending_jobs(),
            dirty: self.persistence.is_dirty(),
            last_saved_at: self.persistence.last_saved_at(),
        }
    }

    /// The underlying job table.
    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    fn require(&self, id: &str) -> Result<JobRecord, ManagerError> {
        self.get(id).ok_or_else(|| {
            debug!(job_id = id, "Job not found");
            ManagerError::JobNotFound(id.to_string())
        })
    }
}

/// Marks a job as having a retry loop running; released on drop.
struct RetryInFlight<'a> {
    retrying: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> RetryInFlight<'a> {
    fn acquire(retrying: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let inserted = retrying
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        inserted.then(|| Self {
            retrying,
            id: id.to_string(),
        })
    }
}

impl Drop for RetryInFlight<'_> {
    fn drop(&mut self) {
        self.retrying
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

fn retry_failure_message(error: &RetryError<EngineError>) -> String {
    match error {
        RetryError::CircuitOpen { remaining, .. } => format!(
            "Too many failed attempts. Try again in {}s.",
            remaining.as_secs_f64().ceil()
        ),
        RetryError::Exhausted {
            attempts, source, ..
        } => format!("Retry failed after {} attempts: {}", attempts, source),
    }
}
