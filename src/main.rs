use std::process::ExitCode;
use tgenstats::cli::Cli;
use tgenstats::config::{Config, ConfigValidator};
use tgenstats::dispatch::{CancelToken, Dispatcher};
use tgenstats::error::{Result, TgenError};
use tgenstats::report::{write_report, ReportMerger};
use tgenstats::source::{compile_patterns, find_sources};

/// Conventional exit status after SIGINT
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "tgenstats=debug" } else { "tgenstats=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    // Load configuration, then let flags win
    let mut config = Config::resolve(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    ConfigValidator::validate(&config)?;

    let patterns = compile_patterns(&config.discovery.patterns)?;
    let sources = find_sources(&cli.path, &patterns)?;
    tracing::info!("processing input from {} files...", sources.len());

    let cancel = CancelToken::new();
    cancel.install_interrupt_handler()?;

    let dispatcher = Dispatcher::new(config.dispatch.workers, config.task_options());
    let mut merger = ReportMerger::new();
    let outcome = dispatcher.run(sources, &cancel, |report| merger.push_report(report));

    match outcome {
        Ok(_) => {}
        Err(TgenError::Cancelled) => {
            eprintln!("interrupted, no stats written; {}", merger.summary());
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
        Err(e) => return Err(e),
    }

    let aggregate = merger.finish();
    let summary = aggregate.summary();
    eprintln!("{}", summary);

    tracing::info!("dumping stats in {}", config.output.prefix.display());
    write_report(&aggregate, &config.output.prefix, config.output.compression)?;
    tracing::info!("all done!");

    if config.dispatch.strict && summary.failed > 0 {
        tracing::error!("{} files could not be processed", summary.failed);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
