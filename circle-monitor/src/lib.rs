//! Circle monitor library exports.

pub mod backend;
pub mod config;
pub mod error;
pub mod log_buffer;
pub mod telemetry;
