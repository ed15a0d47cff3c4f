//! Download manager.
//!
//! Wires the job table to its three coordinators:
//! - **Aggregation**: engine progress events are merged and committed at a bounded rate
//! - **Retry**: user-initiated retries go through backoff and a per-job circuit breaker
//! - **Persistence**: every committed change is written out within the staleness bound

#[allow(clippy::module_inception)]
mod manager;
mod types;

pub use manager::DownloadManager;
pub use types::{ManagerError, ManagerStatus};
