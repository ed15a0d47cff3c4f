//! Debounced, batching update aggregator.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error, trace};

use crate::job::{JobUpdate, StateSink};
use crate::metrics::{FLUSHES, FLUSH_BATCH_SIZE, SINK_ERRORS, UPDATES_QUEUED};
use crate::timer::DelayedTask;

use super::config::AggregatorConfig;

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Debounce,
    Forced,
    Immediate,
}

impl FlushTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Debounce => "debounce",
            FlushTrigger::Forced => "forced",
            FlushTrigger::Immediate => "immediate",
        }
    }
}

/// Updates waiting for the next flush, in first-queued order per job.
#[derive(Default)]
struct Pending {
    updates: HashMap<String, JobUpdate>,
    order: Vec<String>,
    /// Updates queued since the last flush (not jobs).
    queued: usize,
    debounce: DelayedTask,
    force: DelayedTask,
}

impl Pending {
    fn merge(&mut self, update: JobUpdate) {
        self.queued += 1;
        match self.updates.get_mut(&update.id) {
            Some(existing) => existing.merge(update),
            None => {
                self.order.push(update.id.clone());
                self.updates.insert(update.id.clone(), update);
            }
        }
    }

    fn take(&mut self) -> Vec<JobUpdate> {
        self.queued = 0;
        let mut updates = std::mem::take(&mut self.updates);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|id| updates.remove(&id))
            .collect()
    }
}

struct Inner {
    config: AggregatorConfig,
    sink: Arc<dyn StateSink>,
    pending: Mutex<Pending>,
    /// Held from taking the pending set until the sink returns, so commits
    /// reach the sink in the order they were taken.
    flushing: Mutex<()>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, trigger: FlushTrigger) {
        let _flushing = self.flushing.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updates = {
            let mut pending = self.lock();
            // A firing timer releases its own slot instead of aborting itself.
            match trigger {
                FlushTrigger::Debounce => {
                    pending.debounce.detach();
                    pending.force.cancel();
                }
                FlushTrigger::Forced => {
                    pending.force.detach();
                    pending.debounce.cancel();
                }
                FlushTrigger::Immediate => {
                    pending.debounce.cancel();
                    pending.force.cancel();
                }
            }
            pending.take()
        };

        if updates.is_empty() {
            return;
        }

        FLUSHES.with_label_values(&[trigger.as_str()]).inc();
        FLUSH_BATCH_SIZE.observe(updates.len() as f64);
        debug!(
            trigger = trigger.as_str(),
            jobs = updates.len(),
            "Flushing job updates"
        );

        let sink = &self.sink;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            if updates.len() == 1 {
                let update = updates.remove(0);
                sink.apply_update(update)
            } else {
                sink.apply_batch(updates)
            }
        }));

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                SINK_ERRORS.inc();
                error!("Failed to commit job updates: {}", e);
            }
            Err(_) => {
                SINK_ERRORS.inc();
                error!("State sink panicked while committing job updates");
            }
        }
    }
}

async fn flush_later(inner: Weak<Inner>, trigger: FlushTrigger) {
    if let Some(inner) = inner.upgrade() {
        inner.flush(trigger);
    }
}

/// Coalesces per-job update events into bounded-rate commits.
///
/// Progress-only updates are merged per job id and committed when the
/// debounce window elapses (or earlier, via the forced window, during large
/// bursts). Updates carrying a status are committed immediately together with
/// everything else pending.
///
/// Cheap to clone; clones share the same pending set. Queueing must happen
/// inside a tokio runtime since timers are spawned tasks.
#[derive(Clone)]
pub struct UpdateAggregator {
    inner: Arc<Inner>,
}

impl UpdateAggregator {
    pub fn new(config: AggregatorConfig, sink: Arc<dyn StateSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sink,
                pending: Mutex::new(Pending::default()),
                flushing: Mutex::new(()),
            }),
        }
    }

    /// Merge an update into the pending set and schedule its commit.
    ///
    /// Never blocks on the sink unless the update carries a status change.
    pub fn queue_update(&self, update: JobUpdate) {
        if update.is_empty() {
            trace!(job_id = %update.id, "Ignoring empty job update");
            return;
        }
        UPDATES_QUEUED.inc();

        let bypass = update.is_status_change();
        {
            let mut pending = self.inner.lock();
            pending.merge(update);

            if !bypass {
                let weak = Arc::downgrade(&self.inner);
                pending.debounce.schedule(
                    self.inner.config.debounce(),
                    flush_later(weak.clone(), FlushTrigger::Debounce),
                );
                if pending.queued >= self.inner.config.batch_threshold
                    && !pending.force.is_pending()
                {
                    pending.force.schedule(
                        self.inner.config.force_flush(),
                        flush_later(weak, FlushTrigger::Forced),
                    );
                }
                return;
            }
        }

        self.flush_immediately();
    }

    /// Cancel pending timers and commit everything queued so far.
    pub fn flush_immediately(&self) {
        self.inner.flush(FlushTrigger::Immediate);
    }

    /// Number of jobs with an uncommitted update.
    pub fn pending_jobs(&self) -> usize {
        self.inner.lock().updates.len()
    }
}
