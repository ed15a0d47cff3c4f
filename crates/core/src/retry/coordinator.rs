//! Retry coordinator with exponential backoff and per-key circuit breaking.
//!
//! Per key: `Idle -> Retrying -> (Success | Exhausted)`, with an open circuit
//! rejecting calls up front until its cool-down has elapsed.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics::{CIRCUITS_OPENED, CIRCUIT_REJECTIONS, RETRIES_EXHAUSTED, RETRY_ATTEMPTS};

use super::config::RetryConfig;
use super::types::{CircuitBreakerState, RetryError, RetryState, RetryStats};

/// Optional observers for one `execute_with_retry` call.
pub struct RetryHooks<'a, E> {
    on_retry: Option<Box<dyn FnMut(u32, Duration) + Send + 'a>>,
    on_exhausted: Option<Box<dyn FnOnce(&E) + Send + 'a>>,
}

impl<E> Default for RetryHooks<'_, E> {
    fn default() -> Self {
        Self {
            on_retry: None,
            on_exhausted: None,
        }
    }
}

impl<'a, E> RetryHooks<'a, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called before each backoff wait with the retry number (1-based) and
    /// the delay about to be waited.
    pub fn on_retry(mut self, f: impl FnMut(u32, Duration) + Send + 'a) -> Self {
        self.on_retry = Some(Box::new(f));
        self
    }

    /// Called once with the last error when every attempt has failed.
    pub fn on_exhausted(mut self, f: impl FnOnce(&E) + Send + 'a) -> Self {
        self.on_exhausted = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Default)]
struct KeyState {
    retry: RetryState,
    breaker: CircuitBreakerState,
}

/// Runs fallible operations with bounded retries.
///
/// State is tracked per key and created lazily on the first failure. Calls for
/// different keys never interact; overlapping calls for the same key are not
/// serialized and must be avoided by the caller.
pub struct RetryCoordinator {
    config: RetryConfig,
    keys: Mutex<HashMap<String, KeyState>>,
}

impl RetryCoordinator {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, KeyState>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `operation` for `key` without observers.
    pub async fn execute<T, E, F, Fut>(&self, key: &str, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_with_retry(key, operation, RetryHooks::new())
            .await
    }

    /// Run `operation` for `key`, retrying with exponential backoff.
    ///
    /// Fails fast with [`RetryError::CircuitOpen`] while the key's circuit is
    /// open; otherwise makes up to `max_retries + 1` attempts and returns
    /// [`RetryError::Exhausted`] with the last error if all of them fail.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        key: &str,
        mut operation: F,
        mut hooks: RetryHooks<'_, E>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if let Some(remaining) = self.open_circuit_remaining(key) {
            CIRCUIT_REJECTIONS.inc();
            warn!(
                key,
                remaining_ms = remaining.as_millis() as u64,
                "Circuit open, rejecting call"
            );
            return Err(RetryError::CircuitOpen {
                key: key.to_string(),
                remaining,
            });
        }

        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    RETRY_ATTEMPTS.with_label_values(&["success"]).inc();
                    if attempt > 0 {
                        info!(key, attempt, "Operation succeeded after retry");
                    }
                    self.record_success(key);
                    return Ok(value);
                }
                Err(error) => {
                    RETRY_ATTEMPTS.with_label_values(&["failure"]).inc();
                    self.record_failure(key, &error);

                    if attempt >= self.config.max_retries {
                        RETRIES_EXHAUSTED.inc();
                        self.finish_retrying(key);
                        warn!(
                            key,
                            attempts = attempt + 1,
                            "Retries exhausted: {}",
                            error
                        );
                        if let Some(on_exhausted) = hooks.on_exhausted.take() {
                            on_exhausted(&error);
                        }
                        return Err(RetryError::Exhausted {
                            key: key.to_string(),
                            attempts: attempt + 1,
                            source: error,
                        });
                    }

                    let delay = self.config.delay_for_attempt(attempt);
                    attempt += 1;
                    self.start_retrying(key, attempt, delay);
                    debug!(
                        key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying: {}",
                        error
                    );
                    if let Some(on_retry) = hooks.on_retry.as_mut() {
                        on_retry(attempt, delay);
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Current retry/circuit snapshot for `key` (all zeros if unknown).
    pub fn get_retry_stats(&self, key: &str) -> RetryStats {
        let keys = self.lock();
        let Some(state) = keys.get(key) else {
            return RetryStats::default();
        };
        let remaining = state.breaker.remaining_cooldown(
            self.config.circuit_threshold,
            self.config.circuit_cooldown(),
            Instant::now(),
        );
        RetryStats {
            retry_count: state.retry.attempt,
            is_retrying: state.retry.is_retrying,
            circuit_breaker_open: remaining.is_some(),
            consecutive_failures: state.breaker.consecutive_failures,
            last_error: state.retry.last_error.clone(),
            cooldown_remaining_ms: remaining.map(|r| r.as_millis() as u64),
        }
    }

    /// Forget all retry and circuit state for `key`.
    pub fn reset_retry_state(&self, key: &str) {
        if self.lock().remove(key).is_some() {
            debug!(key, "Retry state reset");
        }
    }

    fn open_circuit_remaining(&self, key: &str) -> Option<Duration> {
        let keys = self.lock();
        keys.get(key)?.breaker.remaining_cooldown(
            self.config.circuit_threshold,
            self.config.circuit_cooldown(),
            Instant::now(),
        )
    }

    fn record_success(&self, key: &str) {
        self.lock().remove(key);
    }

    fn record_failure<E: Display>(&self, key: &str, error: &E) {
        let mut keys = self.lock();
        let state = keys.entry(key.to_string()).or_default();
        state.retry.last_error = Some(error.to_string());
        state.breaker.consecutive_failures += 1;
        state.breaker.last_failure_time = Some(Instant::now());
        if state.breaker.consecutive_failures == self.config.circuit_threshold {
            CIRCUITS_OPENED.inc();
            warn!(
                key,
                failures = state.breaker.consecutive_failures,
                "Circuit breaker opened"
            );
        }
    }

    fn start_retrying(&self, key: &str, attempt: u32, delay: Duration) {
        let mut keys = self.lock();
        let state = keys.entry(key.to_string()).or_default();
        state.retry.attempt = attempt;
        state.retry.is_retrying = true;
        state.retry.next_delay = Some(delay);
    }

    fn finish_retrying(&self, key: &str) {
        if let Some(state) = self.lock().get_mut(key) {
            state.retry.is_retrying = false;
            state.retry.next_delay = None;
        }
    }
}
