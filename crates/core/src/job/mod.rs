//! Job records, sparse updates, and the in-memory job table.

mod store;
mod types;

pub use store::{JobStore, SinkError, StateSink};
pub use types::{JobRecord, JobStatus, JobUpdate, NewJob};
