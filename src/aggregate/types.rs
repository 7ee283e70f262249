// Per-source statistics produced by the stream aggregator
use crate::parsing::TransferTiming;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latency and error samples collected for one host.
///
/// This is the value stored under each host name in the final report, so its
/// serialized field names follow the report layout and the fields are
/// declared in key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    /// Number of failed transfers
    #[serde(default)]
    pub error_count: u64,

    /// Transfer sizes of failed transfers, keyed by error code
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<u64>>,

    /// Time to first byte in seconds, keyed by transfer size
    #[serde(rename = "firstbyte", default)]
    pub first_byte: BTreeMap<u64, Vec<f64>>,

    /// Time to last byte in seconds, keyed by transfer size
    #[serde(rename = "lastbyte", default)]
    pub last_byte: BTreeMap<u64, Vec<f64>>,

    /// Number of completed transfers
    #[serde(default)]
    pub success_count: u64,
}

impl NodeStats {
    /// Record one completed transfer
    pub fn record_success(&mut self, bytes: u64, timing: &TransferTiming) {
        self.first_byte
            .entry(bytes)
            .or_default()
            .push(timing.first_byte_latency());
        self.last_byte
            .entry(bytes)
            .or_default()
            .push(timing.last_byte_latency());
        self.success_count += 1;
    }

    /// Record one failed transfer
    pub fn record_error(&mut self, bytes: u64, code: &str) {
        self.errors.entry(code.to_string()).or_default().push(bytes);
        self.error_count += 1;
    }

    /// Total number of first-byte samples across all sizes
    pub fn first_byte_samples(&self) -> usize {
        self.first_byte.values().map(Vec::len).sum()
    }

    /// Total number of last-byte samples across all sizes
    pub fn last_byte_samples(&self) -> usize {
        self.last_byte.values().map(Vec::len).sum()
    }

    /// Total number of error samples across all codes
    pub fn error_samples(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }
}

/// Everything one client-side source contributed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceStats {
    /// Host named by the first host identity line, if the log had one
    pub host_name: Option<String>,
    pub stats: NodeStats,
    /// Lines that matched a trigger but could not be parsed
    pub malformed_lines: u64,
    /// Transfers ignored because they fell inside the skip window
    pub skipped_events: u64,
    /// Lines read from the source
    pub lines: u64,
}

/// Result of consuming one source to the end (or to its discard point)
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    /// Client-side statistics
    Stats(SourceStats),
    /// The log belongs to a server and contributes nothing
    Discard,
}
