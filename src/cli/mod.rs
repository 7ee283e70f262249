//! CLI argument definitions and parsing
use crate::aggregate::ParsePolicy;
use crate::config::Config;
use crate::report::OutputCompression;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tgenstats",
    version,
    author = "neur0map",
    about = "Parse tgen traffic generator logs into per-host latency and error statistics",
    long_about = "Searches PATH for tgen log files (or reads one log from stdin when PATH is '-'), \
                  extracts time-to-first-byte, time-to-last-byte and transfer errors for every \
                  client host, and writes them as JSON. Logs ending in '.xz' are decompressed \
                  inline through xz, logs ending in '.zst' in-process, so large logs never need \
                  to be stored decompressed."
)]
pub struct Cli {
    /// The PATH to search for tgen log files, or '-' for stdin
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Append a regex PATTERN to the file name patterns used to find tgen logs
    #[arg(short = 'e', long = "expression", value_name = "PATTERN")]
    pub expressions: Vec<String>,

    /// Number of worker threads, 0 to use every processor core
    #[arg(short = 'm', long = "multiproc", value_name = "N")]
    pub workers: Option<usize>,

    /// Directory where the stats file is written
    #[arg(short, long, value_name = "DIR")]
    pub prefix: Option<PathBuf>,

    /// Ignore transfers in the first N seconds of each log file
    #[arg(short, long, value_name = "N")]
    pub skip: Option<u64>,

    /// Compression of the stats file
    #[arg(long, value_enum)]
    pub compress: Option<OutputCompression>,

    /// What to do with lines that look like transfers but cannot be parsed ("skip" or "fail")
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<ParsePolicy>,

    /// Exit with a failure status if any log file could not be processed
    #[arg(long)]
    pub strict: bool,

    /// Config file path (defaults to ~/.config/tgenstats/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Apply command-line flags on top of a loaded configuration
    pub fn apply_to(&self, config: &mut Config) {
        config
            .discovery
            .patterns
            .extend(self.expressions.iter().cloned());
        if let Some(workers) = self.workers {
            config.dispatch.workers = workers;
        }
        if let Some(prefix) = &self.prefix {
            config.output.prefix = prefix.clone();
        }
        if let Some(skip) = self.skip {
            config.parsing.skip_seconds = skip;
        }
        if let Some(compression) = self.compress {
            config.output.compression = compression;
        }
        if let Some(policy) = self.policy {
            config.parsing.policy = policy;
        }
        if self.strict {
            config.dispatch.strict = true;
        }
    }
}
