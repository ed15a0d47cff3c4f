//! Update aggregation between the job engine and the job table.
//!
//! High-frequency progress ticks are merged per job and committed at a bounded
//! rate; status transitions skip the wait.

#[allow(clippy::module_inception)]
mod aggregator;
mod config;

pub use aggregator::UpdateAggregator;
pub use config::AggregatorConfig;
