// Integration test: cancelling a run that reads an idle standard input.
//
// Replaces descriptor 0 of the test process, so it lives in its own binary.
use nix::unistd::{dup2, pipe};
use std::os::fd::AsRawFd;
use std::thread;
use std::time::{Duration, Instant};
use tgenstats::dispatch::{CancelToken, Dispatcher, TaskOptions};
use tgenstats::source::Source;
use tgenstats::TgenError;

#[test]
fn test_cancel_with_idle_stdin() {
    // Standard input becomes a pipe whose writer never writes nor closes
    let (read_end, write_end) = pipe().unwrap();
    dup2(read_end.as_raw_fd(), 0).unwrap();
    drop(read_end);

    let cancel = CancelToken::new();
    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            cancel.cancel();
        })
    };

    let dispatcher = Dispatcher::new(1, TaskOptions::default());
    let started = Instant::now();
    let result = dispatcher.run(vec![Source::Stdin], &cancel, |_| panic!("no result expected"));
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(TgenError::Cancelled)));
    assert!(elapsed < Duration::from_secs(5), "cancel took {:?}", elapsed);

    canceller.join().unwrap();
    drop(write_end);
}
