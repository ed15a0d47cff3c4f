//! Persistence scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often, and how stale at most, the job collection is written out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Minimum spacing between writes while mutations keep coming (milliseconds).
    #[serde(default = "default_save_interval")]
    pub save_interval_ms: u64,

    /// Upper bound on how long a committed mutation may stay unsaved (milliseconds).
    #[serde(default = "default_max_staleness")]
    pub max_staleness_ms: u64,

    /// Terminal jobs older than this are dropped when loading.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_save_interval() -> u64 {
    5000
}

fn default_max_staleness() -> u64 {
    30_000
}

fn default_retention_days() -> u32 {
    30
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            save_interval_ms: default_save_interval(),
            max_staleness_ms: default_max_staleness(),
            retention_days: default_retention_days(),
        }
    }
}

impl PersistenceConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }

    pub fn max_staleness(&self) -> Duration {
        Duration::from_millis(self.max_staleness_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}
