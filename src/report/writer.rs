// Serialization of the aggregate to disk

use super::Aggregate;
use crate::dispatch::CancelToken;
use crate::error::{Result, TgenError};
use crate::source::{DecompressCommand, Source, SourceReader};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Base name of the report file
pub const REPORT_FILENAME: &str = "stats.tgen.json";

/// How the report is compressed on disk
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputCompression {
    None,
    /// Piped through an external `xz` process
    #[default]
    Xz,
    /// Compressed in-process with zstd
    Zstd,
}

impl OutputCompression {
    fn suffix(self) -> &'static str {
        match self {
            OutputCompression::None => "",
            OutputCompression::Xz => ".xz",
            OutputCompression::Zstd => ".zst",
        }
    }
}

impl std::str::FromStr for OutputCompression {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(OutputCompression::None),
            "xz" => Ok(OutputCompression::Xz),
            "zstd" => Ok(OutputCompression::Zstd),
            other => Err(format!("unknown compression '{}'", other)),
        }
    }
}

/// Write `aggregate` under `prefix` as indented JSON with sorted keys.
///
/// Names sort as text and transfer sizes numerically, since both come from
/// ordered maps and the struct fields are declared in key order. Returns the
/// path of the written file.
pub fn write_report(
    aggregate: &Aggregate,
    prefix: &Path,
    compression: OutputCompression,
) -> Result<PathBuf> {
    fs::create_dir_all(prefix).map_err(|e| TgenError::Io {
        source: e,
        context: format!("Failed to create output directory: {}", prefix.display()),
    })?;
    let path = prefix.join(format!("{}{}", REPORT_FILENAME, compression.suffix()));

    let file = File::create(&path).map_err(|e| TgenError::Io {
        source: e,
        context: format!("Failed to create report file: {}", path.display()),
    })?;

    match compression {
        OutputCompression::None => {
            let mut out = BufWriter::new(file);
            write_json(&mut out, aggregate, &path)?;
            out.flush().map_err(|e| io_err(e, &path))?;
        }
        OutputCompression::Zstd => {
            let mut encoder =
                zstd::stream::write::Encoder::new(file, 3).map_err(|e| io_err(e, &path))?;
            write_json(&mut encoder, aggregate, &path)?;
            encoder.finish().map_err(|e| io_err(e, &path))?;
        }
        OutputCompression::Xz => write_xz(file, aggregate, &path)?,
    }

    tracing::info!("Wrote stats to {}", path.display());
    Ok(path)
}

/// Read a report written by [`write_report`], decompressing by file suffix
pub fn read_report(path: &Path) -> Result<Aggregate> {
    let source = Source::Path(path.to_path_buf());
    let decompress = DecompressCommand::default();
    let mut reader = SourceReader::open(&source, &decompress, &CancelToken::new())?;
    let aggregate = serde_json::from_reader(&mut reader).map_err(|e| TgenError::Json {
        source: e,
        context: format!("Failed to parse report: {}", path.display()),
    })?;
    reader.close()?;
    Ok(aggregate)
}

fn write_xz(file: File, aggregate: &Aggregate, path: &Path) -> Result<()> {
    let mut child = Command::new("xz")
        .args(["--threads=3", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::from(file))
        .spawn()
        .map_err(|e| TgenError::Io {
            source: e,
            context: "Failed to start xz for report compression".to_string(),
        })?;

    let written = match child.stdin.take() {
        Some(stdin) => {
            let mut out = BufWriter::new(stdin);
            write_json(&mut out, aggregate, path)
                .and_then(|_| out.flush().map_err(|e| io_err(e, path)))
        }
        None => Err(TgenError::Other(anyhow::anyhow!("xz has no stdin pipe"))),
    };

    // stdin is closed by now, so xz sees end of input and exits
    let status = child.wait().map_err(|e| io_err(e, path))?;
    written?;
    if !status.success() {
        return Err(TgenError::Other(anyhow::anyhow!(
            "xz exited with {} while writing {}",
            status,
            path.display()
        )));
    }
    Ok(())
}

fn write_json<W: Write>(out: &mut W, aggregate: &Aggregate, path: &Path) -> Result<()> {
    serde_json::to_writer_pretty(out, aggregate).map_err(|e| TgenError::Json {
        source: e,
        context: format!("Failed to write report: {}", path.display()),
    })
}

fn io_err(e: std::io::Error, path: &Path) -> TgenError {
    TgenError::Io {
        source: e,
        context: format!("Failed to write report: {}", path.display()),
    }
}
