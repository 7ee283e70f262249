//! Line classification for tgen logs
//!
//! Turns one raw log line into a [`Classification`]: host identity, a
//! client-side transfer (completed or failed), a server-side marker, or noise.

mod classifier;
mod types;

pub use classifier::{classify, line_timestamp, COMPLETE_MARKER, ERROR_MARKER, HOST_MARKER};
pub use types::{Classification, TransferEvent, TransferOutcome, TransferTiming};
