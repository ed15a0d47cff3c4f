//! Retry coordination with exponential backoff and circuit breaking.

mod config;
mod coordinator;
mod types;

pub use config::RetryConfig;
pub use coordinator::{RetryCoordinator, RetryHooks};
pub use types::{CircuitBreakerState, RetryError, RetryState, RetryStats};
