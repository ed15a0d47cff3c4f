//! Recording state sink for testing.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::job::{JobUpdate, SinkError, StateSink};

/// One call made to a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    Single(JobUpdate),
    Batch(Vec<JobUpdate>),
}

impl Commit {
    /// Updates carried by this commit, in order.
    pub fn updates(&self) -> Vec<&JobUpdate> {
        match self {
            Commit::Single(update) => vec![update],
            Commit::Batch(updates) => updates.iter().collect(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    commits: Vec<Commit>,
    attempts: usize,
    failing: bool,
}

/// State sink that records every successful commit.
///
/// # Example
///
/// ```rust,ignore
/// let sink = Arc::new(RecordingSink::new());
/// let aggregator = UpdateAggregator::new(AggregatorConfig::default(), sink.clone());
///
/// aggregator.queue_update(JobUpdate::new("abc").status(JobStatus::Downloading));
/// assert_eq!(sink.commits().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordingSink {
    state: Mutex<State>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Successful commits, oldest first.
    pub fn commits(&self) -> Vec<Commit> {
        self.lock().commits.clone()
    }

    /// Every call, including rejected ones.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Make subsequent calls fail with `SinkError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn clear(&self) {
        self.lock().commits.clear();
    }

    fn record(&self, commit: Commit) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.attempts += 1;
        if state.failing {
            return Err(SinkError::Unavailable("recording sink set to fail".to_string()));
        }
        state.commits.push(commit);
        Ok(())
    }
}

impl StateSink for RecordingSink {
    fn apply_update(&self, update: JobUpdate) -> Result<(), SinkError> {
        self.record(Commit::Single(update))
    }

    fn apply_batch(&self, updates: Vec<JobUpdate>) -> Result<(), SinkError> {
        self.record(Commit::Batch(updates))
    }
}
