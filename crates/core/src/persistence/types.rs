//! Persisted payload and persistence errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobRecord;

/// Format tag written with every payload.
pub const PAYLOAD_VERSION: &str = "1";

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage database error: {0}")]
    Database(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the persistence scheduler.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A durable write failed; the collection stays dirty.
    #[error("Failed to write job collection: {0}")]
    Write(#[from] StorageError),

    /// Stored payload does not have the expected shape.
    #[error("Malformed stored payload: {0}")]
    Malformed(String),

    #[error("Failed to serialize job collection: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What is written to storage: the whole job collection plus a tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedJobs {
    pub items: Vec<JobRecord>,
    /// Milliseconds since the Unix epoch at serialization time.
    pub timestamp: i64,
    pub version: String,
}

impl PersistedJobs {
    pub fn new(items: Vec<JobRecord>, now: DateTime<Utc>) -> Self {
        Self {
            items,
            timestamp: now.timestamp_millis(),
            version: PAYLOAD_VERSION.to_string(),
        }
    }
}
