pub mod aggregator;
pub mod config;
pub mod engine;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod persistence;
pub mod retry;
pub mod testing;
pub mod timer;

pub use aggregator::{AggregatorConfig, UpdateAggregator};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, EngineConfig,
    SanitizedConfig, ServerConfig, StorageConfig,
};
pub use engine::{EngineError, HttpJobEngine, JobEngine};
pub use job::{JobRecord, JobStatus, JobStore, JobUpdate, NewJob, SinkError, StateSink};
pub use manager::{DownloadManager, ManagerError, ManagerStatus};
pub use persistence::{
    PersistedJobs, PersistenceConfig, PersistenceError, PersistenceScheduler, SqliteStorage,
    StorageBackend, StorageError,
};
pub use retry::{RetryConfig, RetryCoordinator, RetryError, RetryHooks, RetryStats};
pub use timer::DelayedTask;
