//! Single-pass aggregation of one log source
//!
//! A [`StreamAggregator`] owns the accumulators for exactly one source. Lines
//! are fed in order; a server-side transfer ends the pass with
//! [`SourceOutcome::Discard`] and nothing collected so far survives.

mod types;

pub use types::{NodeStats, SourceOutcome, SourceStats};

use crate::dispatch::CancelToken;
use crate::error::{Result, TgenError};
use crate::parsing::{self, Classification, TransferOutcome};
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// How often (in lines) a running pass checks for cancellation
const CANCEL_POLL_LINES: u64 = 4096;

/// What to do with a line that matched a trigger but failed to parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsePolicy {
    /// Count the line and keep going
    #[default]
    Skip,
    /// Abort the source with a parse error
    Fail,
}

impl std::str::FromStr for ParsePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "skip" => Ok(ParsePolicy::Skip),
            "fail" => Ok(ParsePolicy::Fail),
            other => Err(format!("unknown parse policy '{}'", other)),
        }
    }
}

/// Per-source parsing options
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateOptions {
    pub policy: ParsePolicy,
    /// Ignore transfers logged within this many seconds of the first timestamp
    pub skip_seconds: u64,
}

/// Whether the caller should keep feeding lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Discard,
}

/// Accumulates statistics for one source
pub struct StreamAggregator {
    source_name: String,
    options: AggregateOptions,
    result: SourceStats,
    /// End of the skip window, set by the first timestamped line
    window_end: Option<f64>,
}

impl StreamAggregator {
    pub fn new(source_name: impl Into<String>, options: AggregateOptions) -> Self {
        Self {
            source_name: source_name.into(),
            options,
            result: SourceStats::default(),
            window_end: None,
        }
    }

    /// Feed the next line of the source
    pub fn feed(&mut self, line: &str) -> Result<Flow> {
        self.result.lines += 1;

        if self.options.skip_seconds > 0 && self.window_end.is_none() {
            self.window_end = parsing::line_timestamp(line)
                .map(|start| start + self.options.skip_seconds as f64);
        }

        match parsing::classify(line, self.result.host_name.is_some()) {
            Classification::HostIdentity(name) => {
                tracing::debug!("{}: host name is {}", self.source_name, name);
                self.result.host_name = Some(name);
            }
            Classification::Transfer(event) => {
                if self.in_skip_window(event.timestamp) {
                    self.result.skipped_events += 1;
                    return Ok(Flow::Continue);
                }
                match event.outcome {
                    TransferOutcome::Success(timing) => {
                        self.result.stats.record_success(event.bytes, &timing)
                    }
                    TransferOutcome::Error { code } => {
                        self.result.stats.record_error(event.bytes, &code)
                    }
                }
            }
            Classification::ServerSide => {
                tracing::debug!(
                    "{}: server-side transfer at line {}, discarding source",
                    self.source_name,
                    self.result.lines
                );
                return Ok(Flow::Discard);
            }
            Classification::Malformed(message) => match self.options.policy {
                ParsePolicy::Skip => {
                    tracing::debug!(
                        "{}: skipping malformed line {}: {}",
                        self.source_name,
                        self.result.lines,
                        message
                    );
                    self.result.malformed_lines += 1;
                }
                ParsePolicy::Fail => {
                    return Err(TgenError::Parse {
                        source_name: self.source_name.clone(),
                        line: self.result.lines,
                        message,
                    });
                }
            },
            Classification::Irrelevant => {}
        }

        Ok(Flow::Continue)
    }

    /// Lines fed so far
    pub fn lines(&self) -> u64 {
        self.result.lines
    }

    /// Finish the pass and hand over the collected statistics
    pub fn finish(self) -> SourceStats {
        self.result
    }

    fn in_skip_window(&self, timestamp: Option<f64>) -> bool {
        match (self.window_end, timestamp) {
            (Some(end), Some(ts)) => ts < end,
            _ => false,
        }
    }
}

/// Consume `reader` to the end (or to its discard point) and return the outcome.
///
/// The stream is read one line at a time into a reused buffer; invalid UTF-8
/// is replaced rather than rejected.
pub fn aggregate<R: BufRead>(
    mut reader: R,
    source_name: &str,
    options: AggregateOptions,
    cancel: &CancelToken,
) -> Result<SourceOutcome> {
    let mut aggregator = StreamAggregator::new(source_name, options);
    let mut buf = Vec::with_capacity(1024);

    loop {
        if aggregator.lines() % CANCEL_POLL_LINES == 0 {
            cancel.check()?;
        }

        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| {
                // An interruptible reader gives up with an error once cancelled
                if cancel.is_cancelled() {
                    TgenError::Cancelled
                } else {
                    TgenError::Io {
                        source: e,
                        context: format!("Failed to read from {}", source_name),
                    }
                }
            })?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        if aggregator.feed(&line)? == Flow::Discard {
            return Ok(SourceOutcome::Discard);
        }
    }

    let result = aggregator.finish();
    tracing::debug!(
        "{}: {} lines, {} successes, {} errors, {} malformed",
        source_name,
        result.lines,
        result.stats.success_count,
        result.stats.error_count,
        result.malformed_lines
    );
    Ok(SourceOutcome::Stats(result))
}
