//! Log sources and how to read them
//!
//! A [`Source`] is a path or standard input. [`SourceReader`] turns it into a
//! buffered line stream, decompressing `.xz` files through an external process
//! and `.zst` files in-process, and owns every handle it opens. Standard input
//! is polled so that cancellation is noticed even while the producer is idle.

mod discovery;
mod poll;

pub use discovery::{compile_patterns, find_sources, DEFAULT_PATTERN};

use poll::PollingReader;

use crate::dispatch::CancelToken;
use crate::error::{Result, TgenError};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

/// Command-line token that selects standard input
pub const STDIN_MARKER: &str = "-";

/// One logical log input
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Stdin,
    Path(PathBuf),
}

/// How the bytes of a source are encoded on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    /// Decompressed by an external process
    Xz,
    /// Decompressed in-process
    Zstd,
}

impl Source {
    /// Interpret a command-line path, where `-` means standard input
    pub fn from_arg(arg: &str) -> Self {
        if arg == STDIN_MARKER {
            Source::Stdin
        } else {
            Source::Path(PathBuf::from(arg))
        }
    }

    pub fn compression(&self) -> Compression {
        match self {
            Source::Stdin => Compression::None,
            Source::Path(path) => {
                let name = path.to_string_lossy();
                if name.ends_with(".xz") {
                    Compression::Xz
                } else if name.ends_with(".zst") {
                    Compression::Zstd
                } else {
                    Compression::None
                }
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stdin => f.write_str(STDIN_MARKER),
            Source::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// External command used to decompress `.xz` sources; the path is appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DecompressCommand {
    fn default() -> Self {
        Self {
            program: "xz".to_string(),
            args: vec!["--decompress".to_string(), "--stdout".to_string()],
        }
    }
}

impl DecompressCommand {
    /// Build from an argv-style list, e.g. `["xz", "-dc"]`
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn spawn(&self, path: &Path) -> io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
    }
}

/// Buffered line stream over one opened source.
///
/// Field order matters: the reader (and with it the pipe) is dropped before
/// the decompressor is reaped, so a child blocked on a full pipe always sees
/// it close.
pub struct SourceReader {
    reader: Box<dyn BufRead>,
    process: Option<DecompressorProcess>,
    name: String,
}

impl SourceReader {
    /// Open `source` for reading. Failure is fatal to this source only.
    ///
    /// Reads from standard input fail once `cancel` fires instead of waiting
    /// for the producer.
    pub fn open(
        source: &Source,
        decompress: &DecompressCommand,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let name = source.to_string();
        let open_err = |e: io::Error| TgenError::SourceOpen {
            source_name: name.clone(),
            source: e,
        };

        let (reader, process): (Box<dyn BufRead>, Option<DecompressorProcess>) =
            match (source, source.compression()) {
                (Source::Stdin, _) => {
                    let stdin = PollingReader::stdin(cancel.clone()).map_err(open_err)?;
                    (Box::new(BufReader::new(stdin)), None)
                }
                (Source::Path(path), Compression::Xz) => {
                    let child = decompress.spawn(path).map_err(open_err)?;
                    tracing::debug!(
                        "{}: spawned {} (pid {})",
                        name,
                        decompress.program,
                        child.id()
                    );
                    let mut process = DecompressorProcess::new(child, name.clone());
                    let stdout = process.child.stdout.take().ok_or_else(|| {
                        open_err(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "decompressor has no stdout pipe",
                        ))
                    })?;
                    (Box::new(BufReader::new(stdout)), Some(process))
                }
                (Source::Path(path), Compression::Zstd) => {
                    let file = File::open(path).map_err(open_err)?;
                    let decoder = zstd::stream::read::Decoder::new(file).map_err(open_err)?;
                    (Box::new(BufReader::new(decoder)), None)
                }
                (Source::Path(path), Compression::None) => {
                    let file = File::open(path).map_err(open_err)?;
                    (Box::new(BufReader::new(file)), None)
                }
            };

        Ok(Self {
            reader,
            process,
            name,
        })
    }

    /// Process id of the external decompressor, if one is running
    pub fn decompressor_pid(&self) -> Option<u32> {
        self.process.as_ref().map(|p| p.child.id())
    }

    /// Release the source after it was read to the end.
    ///
    /// Returns the decompressor's exit status when there was one.
    pub fn close(self) -> Result<Option<ExitStatus>> {
        let SourceReader {
            reader,
            process,
            name,
        } = self;
        drop(reader);

        match process {
            Some(mut process) => {
                let status = process.wait().map_err(|e| TgenError::Io {
                    source: e,
                    context: format!("Failed to wait for decompressor of {}", name),
                })?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// Release the source before it was read to the end (discard, error or
    /// cancellation). Any decompressor is terminated and reaped.
    pub fn abort(self) {
        let SourceReader {
            reader, process, ..
        } = self;
        drop(reader);
        drop(process);
    }
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl BufRead for SourceReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

/// A spawned decompressor that is always reaped, at the latest on drop
struct DecompressorProcess {
    child: Child,
    reaped: bool,
    name: String,
}

impl DecompressorProcess {
    fn new(child: Child, name: String) -> Self {
        Self {
            child,
            reaped: false,
            name,
        }
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }

    /// Ask a still-running child to exit, then reap it
    fn terminate(&mut self) -> io::Result<ExitStatus> {
        if self.child.try_wait()?.is_none() {
            let pid = Pid::from_raw(self.child.id() as i32);
            if let Err(e) = kill(pid, Signal::SIGTERM) {
                tracing::debug!("{}: SIGTERM to decompressor failed ({}), killing", self.name, e);
                self.child.kill()?;
            }
        }
        self.wait()
    }
}

impl Drop for DecompressorProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        match self.terminate() {
            Ok(status) => tracing::debug!("{}: decompressor stopped early ({})", self.name, status),
            Err(e) => tracing::warn!("{}: failed to reap decompressor: {}", self.name, e),
        }
    }
}
