//! Retry and circuit breaker state.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

/// Errors surfaced by the retry coordinator.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Too many consecutive failures; calls are suspended for a while.
    #[error("circuit open for {key}: try again in {}s", .remaining.as_secs_f64().ceil())]
    CircuitOpen { key: String, remaining: Duration },

    /// Every attempt failed; wraps the last error.
    #[error("{key} failed after {attempts} attempts: {source}")]
    Exhausted {
        key: String,
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RetryError::CircuitOpen { .. })
    }

    /// Remaining cool-down when the circuit is open.
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        match self {
            RetryError::CircuitOpen { remaining, .. } => Some(*remaining),
            RetryError::Exhausted { .. } => None,
        }
    }

    /// The last operation error, if any attempt ran.
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::CircuitOpen { .. } => None,
            RetryError::Exhausted { source, .. } => Some(source),
        }
    }
}

/// Progress of the current (or last) execution for one key.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Retries performed so far.
    pub attempt: u32,
    pub last_error: Option<String>,
    /// True while waiting out a backoff delay.
    pub is_retrying: bool,
    pub next_delay: Option<Duration>,
}

/// Failure history for one key.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerState {
    pub consecutive_failures: u32,
    pub last_failure_time: Option<Instant>,
}

impl CircuitBreakerState {
    /// Remaining cool-down if the circuit is open at `now`.
    pub fn remaining_cooldown(
        &self,
        threshold: u32,
        cooldown: Duration,
        now: Instant,
    ) -> Option<Duration> {
        if self.consecutive_failures < threshold {
            return None;
        }
        let last = self.last_failure_time?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    pub fn is_open(&self, threshold: u32, cooldown: Duration, now: Instant) -> bool {
        self.remaining_cooldown(threshold, cooldown, now).is_some()
    }
}

/// Snapshot for UI display and gating.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetryStats {
    pub retry_count: u32,
    pub is_retrying: bool,
    pub circuit_breaker_open: bool,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
}
