//! Mock job engine for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::{EngineError, JobEngine};
use crate::job::JobRecord;

/// Which engine operation was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCall {
    Start,
    Retry,
    Cancel,
}

/// A recorded engine call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedEngineCall {
    pub call: EngineCall,
    pub job_id: String,
    /// Whether the call succeeded.
    pub success: bool,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the JobEngine trait.
///
/// Provides controllable behavior for testing:
/// - Track calls for assertions
/// - Fail the next N calls, or every call
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockJobEngine::new();
///
/// // Two failures, then success
/// engine.fail_times(2).await;
/// assert!(engine.retry("job-1").await.is_err());
/// assert!(engine.retry("job-1").await.is_err());
/// assert!(engine.retry("job-1").await.is_ok());
///
/// assert_eq!(engine.calls_of(EngineCall::Retry).await.len(), 3);
/// ```
#[derive(Debug)]
pub struct MockJobEngine {
    calls: Arc<RwLock<Vec<RecordedEngineCall>>>,
    /// Remaining calls that will fail.
    failures_left: Arc<RwLock<u32>>,
    /// Fail every call regardless of `failures_left`.
    always_fail: Arc<RwLock<bool>>,
}

impl Default for MockJobEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobEngine {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            failures_left: Arc::new(RwLock::new(0)),
            always_fail: Arc::new(RwLock::new(false)),
        }
    }

    /// Make the next `n` calls fail.
    pub async fn fail_times(&self, n: u32) {
        *self.failures_left.write().await = n;
    }

    /// Make every call fail until turned off.
    pub async fn set_always_fail(&self, fail: bool) {
        *self.always_fail.write().await = fail;
    }

    /// All recorded calls, oldest first.
    pub async fn calls(&self) -> Vec<RecordedEngineCall> {
        self.calls.read().await.clone()
    }

    /// Recorded calls of one kind.
    pub async fn calls_of(&self, call: EngineCall) -> Vec<RecordedEngineCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.call == call)
            .cloned()
            .collect()
    }

    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    async fn handle(&self, call: EngineCall, job_id: &str) -> Result<(), EngineError> {
        let fail = if *self.always_fail.read().await {
            true
        } else {
            let mut left = self.failures_left.write().await;
            if *left > 0 {
                *left -= 1;
                true
            } else {
                false
            }
        };

        self.calls.write().await.push(RecordedEngineCall {
            call,
            job_id: job_id.to_string(),
            success: !fail,
            timestamp: Utc::now(),
        });

        if fail {
            Err(EngineError::ConnectionFailed("mock engine offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobEngine for MockJobEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self, job: &JobRecord) -> Result<(), EngineError> {
        self.handle(EngineCall::Start, &job.id).await
    }

    async fn retry(&self, job_id: &str) -> Result<(), EngineError> {
        self.handle(EngineCall::Retry, job_id).await
    }

    async fn cancel(&self, job_id: &str) -> Result<(), EngineError> {
        self.handle(EngineCall::Cancel, job_id).await
    }
}
