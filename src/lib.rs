//! framegate library root.
//!
//! An I/O isolation runtime: typed I/O events submitted by a latency-
//! sensitive host are queued, scheduled, and completed on background workers
//! and dedicated I/O threads, so the host's frame budget is never spent on
//! blocking file, network, or texture-sharing work.

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod core;
pub mod error;
pub mod fileio;

pub type Result<T> = error::FramegateResult<T>;
