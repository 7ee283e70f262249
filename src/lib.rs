//! tgenstats - tgen traffic generator log statistics
//!
//! Streams many tgen logs (plain, compressed, or piped on stdin) through a
//! pool of workers, extracts per-transfer latencies and errors for every
//! client host, and merges them into one report.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod parsing;
pub mod report;
pub mod source;

pub use error::{Result, TgenError};
