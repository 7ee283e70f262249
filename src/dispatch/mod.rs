// Parallel dispatch: one task per source over a fixed pool of worker threads

mod cancel;

pub use cancel::CancelToken;

use crate::aggregate::{aggregate, AggregateOptions, SourceOutcome, SourceStats};
use crate::error::{Result, TgenError};
use crate::source::{DecompressCommand, Source, SourceReader};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the dispatching thread waits for a result before re-checking
/// for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tagged result of one source task
#[derive(Debug)]
pub enum TaskResult {
    Stats(SourceStats),
    Discard,
    Failed(TgenError),
}

impl From<Result<SourceOutcome>> for TaskResult {
    fn from(result: Result<SourceOutcome>) -> Self {
        match result {
            Ok(SourceOutcome::Stats(stats)) => TaskResult::Stats(stats),
            Ok(SourceOutcome::Discard) => TaskResult::Discard,
            Err(e) => TaskResult::Failed(e),
        }
    }
}

/// A finished task as handed back to the caller
#[derive(Debug)]
pub struct TaskReport {
    /// Position of the source in the submitted list
    pub index: usize,
    pub source: Source,
    pub result: TaskResult,
}

/// Settings every task needs
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub aggregate: AggregateOptions,
    pub decompress: DecompressCommand,
}

/// Runs source tasks across a fixed number of worker threads
pub struct Dispatcher {
    workers: usize,
    options: Arc<TaskOptions>,
}

impl Dispatcher {
    /// Create a dispatcher; `workers == 0` uses all available parallelism
    pub fn new(workers: usize, options: TaskOptions) -> Self {
        let workers = if workers == 0 {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            workers
        };

        Self {
            workers,
            options: Arc::new(options),
        }
    }

    /// Number of worker threads this dispatcher runs
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every source, handing each finished task to `on_result` in
    /// order of completion. Returns the number of tasks delivered.
    ///
    /// When `cancel` fires, no further task starts, running tasks stop at
    /// their next poll and release their sources, all workers are joined and
    /// [`TgenError::Cancelled`] is returned. Results are not delivered once
    /// cancellation has been observed.
    pub fn run<F>(
        &self,
        sources: Vec<Source>,
        cancel: &CancelToken,
        mut on_result: F,
    ) -> Result<usize>
    where
        F: FnMut(TaskReport),
    {
        cancel.check()?;
        if sources.is_empty() {
            return Ok(0);
        }

        let worker_count = self.workers.min(sources.len());
        tracing::info!(
            "Processing {} sources with {} workers",
            sources.len(),
            worker_count
        );

        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        for job in sources.into_iter().enumerate() {
            // The receiver is alive for the whole function, so send cannot fail
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            match self.spawn_worker(id, job_rx.clone(), result_tx.clone(), cancel.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Starve the workers already running, then wait for them
                    while job_rx.try_recv().is_ok() {}
                    drop(result_tx);
                    if let Err(join_err) = join_workers(handles) {
                        tracing::warn!("After failed worker spawn: {}", join_err);
                    }
                    return Err(e);
                }
            }
        }
        drop(result_tx);
        drop(job_rx);

        let delivered = collect_results(&result_rx, cancel, &mut on_result);
        let joined = join_workers(handles);

        if cancel.is_cancelled() {
            tracing::warn!("Cancelled after {} completed sources", delivered);
            return Err(TgenError::Cancelled);
        }
        joined?;

        Ok(delivered)
    }

    /// Process every source and return the results in submission order
    pub fn run_all(&self, sources: Vec<Source>, cancel: &CancelToken) -> Result<Vec<TaskReport>> {
        let mut reports = Vec::with_capacity(sources.len());
        self.run(sources, cancel, |report| reports.push(report))?;
        reports.sort_by_key(|report| report.index);
        Ok(reports)
    }

    fn spawn_worker(
        &self,
        id: usize,
        jobs: Receiver<(usize, Source)>,
        results: Sender<TaskReport>,
        cancel: CancelToken,
    ) -> Result<JoinHandle<()>> {
        let options = Arc::clone(&self.options);
        thread::Builder::new()
            .name(format!("tgen-worker-{}", id))
            .spawn(move || worker_loop(jobs, results, &options, &cancel))
            .map_err(|e| TgenError::Io {
                source: e,
                context: format!("Failed to spawn worker thread {}", id),
            })
    }
}

/// Receive results until every worker has hung up or cancellation is seen
fn collect_results<F>(
    results: &Receiver<TaskReport>,
    cancel: &CancelToken,
    on_result: &mut F,
) -> usize
where
    F: FnMut(TaskReport),
{
    let mut delivered = 0;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match results.recv_timeout(POLL_INTERVAL) {
            Ok(report) => {
                if cancel.is_cancelled() {
                    break;
                }
                delivered += 1;
                on_result(report);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    delivered
}

fn join_workers(handles: Vec<JoinHandle<()>>) -> Result<()> {
    let mut panicked = 0;
    for handle in handles {
        if handle.join().is_err() {
            panicked += 1;
        }
    }
    if panicked > 0 {
        tracing::error!("{} worker threads panicked", panicked);
        return Err(TgenError::Other(anyhow::anyhow!(
            "{} worker threads panicked",
            panicked
        )));
    }
    Ok(())
}

fn worker_loop(
    jobs: Receiver<(usize, Source)>,
    results: Sender<TaskReport>,
    options: &TaskOptions,
    cancel: &CancelToken,
) {
    while let Ok((index, source)) = jobs.recv() {
        if cancel.is_cancelled() {
            break;
        }

        let result = TaskResult::from(process_source(&source, options, cancel));
        if let TaskResult::Failed(e) = &result {
            if !e.is_cancellation() {
                tracing::debug!("{}: failed: {}", source, e);
            }
        }

        let report = TaskReport {
            index,
            source,
            result,
        };
        if results.send(report).is_err() {
            break;
        }
    }
}

/// Open, aggregate and release one source.
///
/// The source is released on every path: read to the end it is closed (and
/// its decompressor's exit status checked); after a discard or an error it is
/// aborted, which terminates and reaps any decompressor.
pub fn process_source(
    source: &Source,
    options: &TaskOptions,
    cancel: &CancelToken,
) -> Result<SourceOutcome> {
    let name = source.to_string();
    let mut reader = SourceReader::open(source, &options.decompress, cancel)?;

    match aggregate(&mut reader, &name, options.aggregate, cancel) {
        Ok(SourceOutcome::Stats(stats)) => {
            if let Some(status) = reader.close()? {
                if !status.success() {
                    tracing::warn!("{}: decompressor exited with {}", name, status);
                }
            }
            Ok(SourceOutcome::Stats(stats))
        }
        Ok(SourceOutcome::Discard) => {
            reader.abort();
            Ok(SourceOutcome::Discard)
        }
        Err(e) => {
            reader.abort();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn client_log(host: &str, transfers: usize) -> String {
        let mut log = format!(
            "2017-07-25 18:23:19 1000.000000 [message] [tgen-main.c:99] [_tgenmain_run] \
             Initializing traffic generator on host {host} process id 1\n"
        );
        for _ in 0..transfers {
            log += "2017-07-25 18:23:19 1001.000000 [message] [tgen-transfer.c:363] [_tgentransfer_log] \
                    [transfer-complete] transport TCP,12,a,b transfer (t-1-client-GET-100-s-0-error=NONE) \
                    total-bytes-read=100 total-bytes-write=0 payload-bytes-read=100/100 (100.00%) \
                    msecs-to-command=1 msecs-to-response=2 msecs-to-first-byte=3 msecs-to-last-byte=4 \
                    msecs-to-checksum=5\n";
        }
        log
    }

    #[test]
    fn test_zero_workers_uses_available_parallelism() {
        let dispatcher = Dispatcher::new(0, TaskOptions::default());
        assert!(dispatcher.workers() >= 1);
        assert_eq!(Dispatcher::new(3, TaskOptions::default()).workers(), 3);
    }

    #[test]
    fn test_empty_source_list() {
        let dispatcher = Dispatcher::new(2, TaskOptions::default());
        let reports = dispatcher.run_all(vec![], &CancelToken::new()).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn test_results_in_submission_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut sources = Vec::new();
        for i in 0..8 {
            let path = temp_dir.path().join(format!("tgen.{}.log", i));
            fs::write(&path, client_log(&format!("client{}", i), i + 1)).unwrap();
            sources.push(Source::Path(path));
        }

        let dispatcher = Dispatcher::new(3, TaskOptions::default());
        let reports = dispatcher.run_all(sources.clone(), &CancelToken::new()).unwrap();

        assert_eq!(reports.len(), 8);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.index, i);
            assert_eq!(report.source, sources[i]);
            match &report.result {
                TaskResult::Stats(stats) => {
                    assert_eq!(stats.host_name, Some(format!("client{}", i)));
                    assert_eq!(stats.stats.success_count, i as u64 + 1);
                }
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn test_failure_does_not_stop_batch() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("tgen.good.log");
        fs::write(&good, client_log("client1", 2)).unwrap();
        let sources = vec![
            Source::Path(temp_dir.path().join("tgen.missing.log")),
            Source::Path(good),
        ];

        let reports = Dispatcher::new(1, TaskOptions::default())
            .run_all(sources, &CancelToken::new())
            .unwrap();

        assert!(matches!(
            reports[0].result,
            TaskResult::Failed(TgenError::SourceOpen { .. })
        ));
        assert!(matches!(reports[1].result, TaskResult::Stats(_)));
    }

    #[test]
    fn test_already_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tgen.log");
        fs::write(&path, client_log("client1", 1)).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = Dispatcher::new(2, TaskOptions::default())
            .run(vec![Source::Path(path)], &cancel, |_| panic!("no result expected"));

        assert!(matches!(result, Err(TgenError::Cancelled)));
    }
}
