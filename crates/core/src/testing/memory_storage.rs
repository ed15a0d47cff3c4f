//! In-memory storage backend for testing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::persistence::{StorageBackend, StorageError};

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, String>,
    failing: bool,
    attempts: usize,
    writes: usize,
}

/// Storage backend keeping values in a map.
///
/// Can be told to fail, in which case both reads and writes return
/// `StorageError::Unavailable` and nothing is stored.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a stored value directly.
    pub fn set(&self, key: &str, value: &str) {
        self.lock()
            .values
            .insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().values.get(key).cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Successful writes.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Write calls, including failed ones.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let state = self.lock();
        if state.failing {
            return Err(StorageError::Unavailable("memory storage set to fail".to_string()));
        }
        Ok(state.values.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.attempts += 1;
        if state.failing {
            return Err(StorageError::Unavailable("memory storage set to fail".to_string()));
        }
        state.values.insert(key.to_string(), value.to_string());
        state.writes += 1;
        Ok(())
    }
}
