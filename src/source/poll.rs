// Interruptible reads for inputs that can stay idle indefinitely

use crate::dispatch::CancelToken;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;

/// Longest single wait before the cancel flag is checked again
const POLL_TIMEOUT_MS: u16 = 100;

/// Reads from a descriptor only once poll(2) reports it ready, so a
/// cancelled run never stays blocked on a silent producer.
///
/// After cancellation every read fails with an [`io::ErrorKind::Other`] error.
pub(crate) struct PollingReader {
    file: File,
    cancel: CancelToken,
}

impl PollingReader {
    pub(crate) fn new(file: File, cancel: CancelToken) -> Self {
        Self { file, cancel }
    }

    /// Standard input, read through a duplicate of descriptor 0 so that
    /// dropping the reader leaves the process's stdin open
    pub(crate) fn stdin(cancel: CancelToken) -> io::Result<Self> {
        let fd = io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self::new(File::from(fd), cancel))
    }

    fn wait_readable(&self) -> io::Result<bool> {
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
            Ok(0) | Err(Errno::EINTR) => Ok(false),
            // Readable, hung up or in error: read reports which
            Ok(_) => Ok(true),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

impl Read for PollingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(io::Error::other("read cancelled"));
            }
            if self.wait_readable()? {
                return self.file.read(buf);
            }
        }
    }
}
