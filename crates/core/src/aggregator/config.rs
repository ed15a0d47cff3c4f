//! Update aggregator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the update aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Quiescence window (milliseconds).
    /// Every queued update restarts this window; pending updates are
    /// committed once it elapses without new updates.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Forced flush window (milliseconds), shorter than the debounce window.
    /// Armed once a burst crosses `batch_threshold` and not reset by later
    /// updates, so a steady stream cannot starve commits.
    #[serde(default = "default_force_flush")]
    pub force_flush_ms: u64,

    /// Number of updates queued since the last flush that arms the forced
    /// flush.
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,
}

fn default_debounce() -> u64 {
    100
}

fn default_force_flush() -> u64 {
    50
}

fn default_batch_threshold() -> usize {
    10
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
            force_flush_ms: default_force_flush(),
            batch_threshold: default_batch_threshold(),
        }
    }
}

impl AggregatorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn force_flush(&self) -> Duration {
        Duration::from_millis(self.force_flush_ms)
    }
}
