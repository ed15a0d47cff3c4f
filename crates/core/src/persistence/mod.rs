//! Durable storage of the job collection.

mod backend;
mod config;
mod scheduler;
mod sqlite;
mod types;

pub use backend::StorageBackend;
pub use config::PersistenceConfig;
pub use scheduler::{decode_payload, PersistenceScheduler};
pub use sqlite::SqliteStorage;
pub use types::{PersistedJobs, PersistenceError, StorageError, PAYLOAD_VERSION};
