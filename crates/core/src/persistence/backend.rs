//! Storage backend abstraction.

use async_trait::async_trait;

use super::types::StorageError;

/// Durable key/value storage for serialized payloads.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Read the value stored under `key`, if any.
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}
