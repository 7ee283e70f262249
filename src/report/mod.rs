//! Merging per-source results into the final report
//!
//! [`ReportMerger`] is a streaming fold: tasks are pushed as the dispatcher
//! delivers them and the [`Aggregate`] is only handed out by
//! [`ReportMerger::finish`]. It runs on a single thread, so the aggregate is
//! never shared.

mod writer;

pub use writer::{read_report, write_report, OutputCompression, REPORT_FILENAME};

use crate::aggregate::NodeStats;
use crate::dispatch::{TaskReport, TaskResult};
use crate::source::Source;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-host statistics of one run plus source counters.
///
/// Fields are declared in the order their keys appear in the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde(default)]
    pub discarded_sources: u64,
    #[serde(default)]
    pub failed_sources: u64,
    /// Sources that named their host
    pub named_sources: u64,
    /// Statistics keyed by host name
    pub nodes: BTreeMap<String, NodeStats>,
    pub total_errors: u64,
    pub total_success: u64,
    /// Client-side sources without a host identity line
    pub unnamed_sources: u64,
}

impl Aggregate {
    /// Counters for status output
    pub fn summary(&self) -> Summary {
        Summary {
            sources: self.named_sources
                + self.unnamed_sources
                + self.discarded_sources
                + self.failed_sources,
            successes: self.total_success,
            errors: self.total_errors,
            named: self.named_sources,
            unnamed: self.unnamed_sources,
            discarded: self.discarded_sources,
            failed: self.failed_sources,
        }
    }
}

/// Human-readable run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub sources: u64,
    pub successes: u64,
    pub errors: u64,
    pub named: u64,
    pub unnamed: u64,
    pub discarded: u64,
    pub failed: u64,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "done processing input: {} total successes, {} total errors, {} files with names, {} files without names",
            self.successes, self.errors, self.named, self.unnamed
        )?;
        if self.discarded > 0 || self.failed > 0 {
            write!(
                f,
                " ({} server-side files ignored, {} files failed)",
                self.discarded, self.failed
            )?;
        }
        Ok(())
    }
}

/// Folds task results into an [`Aggregate`]
#[derive(Debug, Default)]
pub struct ReportMerger {
    aggregate: Aggregate,
}

impl ReportMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one finished task
    pub fn push(&mut self, source: &Source, result: TaskResult) {
        let agg = &mut self.aggregate;
        match result {
            TaskResult::Discard => {
                tracing::debug!("{}: server-side log ignored", source);
                agg.discarded_sources += 1;
            }
            TaskResult::Failed(e) => {
                tracing::error!("{}: {}", source, e);
                agg.failed_sources += 1;
            }
            TaskResult::Stats(stats) => match stats.host_name {
                None => {
                    tracing::debug!("{}: no host name found", source);
                    agg.unnamed_sources += 1;
                }
                Some(name) => {
                    agg.named_sources += 1;
                    agg.total_success += stats.stats.success_count;
                    agg.total_errors += stats.stats.error_count;
                    if agg.nodes.insert(name.clone(), stats.stats).is_some() {
                        tracing::warn!(
                            "{}: host {} already reported by another file, keeping the later one",
                            source,
                            name
                        );
                    }
                }
            },
        }
    }

    /// Merge a report as delivered by the dispatcher
    pub fn push_report(&mut self, report: TaskReport) {
        self.push(&report.source, report.result);
    }

    /// Counters so far
    pub fn summary(&self) -> Summary {
        self.aggregate.summary()
    }

    pub fn finish(self) -> Aggregate {
        self.aggregate
    }
}

/// Merge a complete sequence of task results
pub fn merge<I>(results: I) -> Aggregate
where
    I: IntoIterator<Item = (Source, TaskResult)>,
{
    let mut merger = ReportMerger::new();
    for (source, result) in results {
        merger.push(&source, result);
    }
    merger.finish()
}
