// Search path traversal: collect log files whose names match a pattern

use super::{Source, STDIN_MARKER};
use crate::error::{Result, TgenError};
use regex::Regex;
use std::path::Path;
use walkdir::WalkDir;

/// File name pattern of logs written by tgen under shadow
pub const DEFAULT_PATTERN: &str = r"tgen.*\.log";

/// Compile file name patterns, reporting the first invalid one
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| TgenError::InvalidConfigValue {
                path: "discovery.patterns".to_string(),
                message: format!("invalid pattern '{}': {}", p, e),
            })
        })
        .collect()
}

/// Find every source under `search_path`.
///
/// `-` selects standard input. Otherwise the tree is walked (symlinks are not
/// followed) and every regular file whose base name matches any pattern,
/// anywhere in the name, becomes a source. Results are sorted by path.
pub fn find_sources(search_path: &str, patterns: &[Regex]) -> Result<Vec<Source>> {
    if search_path == STDIN_MARKER {
        return Ok(vec![Source::Stdin]);
    }

    let root = Path::new(search_path);
    if !root.exists() {
        return Err(TgenError::Discovery(format!(
            "search path does not exist: {}",
            root.display()
        )));
    }

    let mut sources = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let matched = {
            let name = entry.file_name().to_string_lossy();
            patterns.iter().any(|p| p.is_match(&name))
        };
        if matched {
            sources.push(Source::Path(entry.into_path()));
        }
    }

    tracing::debug!("Found {} log files under {}", sources.len(), root.display());
    Ok(sources)
}
