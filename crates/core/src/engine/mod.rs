//! Job engine abstraction.
//!
//! This module provides a `JobEngine` trait for driving the process that
//! performs the transfers, and an HTTP implementation of it.

mod http;
mod types;

pub use http::HttpJobEngine;
pub use types::*;
