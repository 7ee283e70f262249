//! Configuration management for tgenstats
//!
//! Settings are layered: built-in defaults, an optional TOML file, then
//! `TGENSTATS_SECTION__KEY` environment variables. Command-line flags are
//! applied on top by the binary.

use crate::aggregate::{AggregateOptions, ParsePolicy};
use crate::dispatch::TaskOptions;
use crate::error::{Result, TgenError};
use crate::report::OutputCompression;
use crate::source::{DecompressCommand, DEFAULT_PATTERN};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Prefix of environment variables that override configuration values
pub const ENV_PREFIX: &str = "TGENSTATS_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub dispatch: DispatchConfig,
    pub parsing: ParsingConfig,
    pub decompress: DecompressConfig,
    pub output: OutputConfig,
}

/// Which files under the search path are tgen logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Regexes matched anywhere in a file's base name
    pub patterns: Vec<String>,
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Worker threads; 0 uses every available core
    pub workers: usize,
    /// Exit non-zero when any source failed
    pub strict: bool,
}

/// Line parsing settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub policy: ParsePolicy,
    /// Ignore transfers in the first N seconds of each log
    pub skip_seconds: u64,
}

/// External decompressor for `.xz` logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompressConfig {
    /// Program and arguments; the log path is appended
    pub command: Vec<String>,
}

/// Where and how the report is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub prefix: PathBuf,
    pub compression: OutputCompression,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            patterns: vec![DEFAULT_PATTERN.to_string()],
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            strict: false,
        }
    }
}

impl Default for DecompressConfig {
    fn default() -> Self {
        let command = DecompressCommand::default();
        Self {
            command: std::iter::once(command.program).chain(command.args).collect(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from("."),
            compression: OutputCompression::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TgenError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TgenError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load `explicit` if given, else the default config file if it exists,
    /// else the built-in defaults (with environment overrides applied)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = Self::default_path() {
            if path.exists() {
                tracing::debug!("Using config file {:?}", path);
                return Self::load(&path);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TGENSTATS_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `(name, value)` overrides, ignoring names without the prefix
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let invalid = |message: String| TgenError::InvalidConfigValue {
            path: path.to_string(),
            message,
        };

        match path {
            "DISCOVERY__PATTERNS" => {
                self.discovery.patterns = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "DISPATCH__WORKERS" => {
                self.dispatch.workers = value
                    .parse()
                    .map_err(|_| invalid(format!("Cannot parse '{}' as a worker count", value)))?;
            }
            "DISPATCH__STRICT" => {
                self.dispatch.strict = value
                    .parse()
                    .map_err(|_| invalid(format!("Cannot parse '{}' as boolean", value)))?;
            }
            "PARSING__POLICY" => {
                self.parsing.policy = value.parse().map_err(invalid)?;
            }
            "PARSING__SKIP_SECONDS" => {
                self.parsing.skip_seconds = value
                    .parse()
                    .map_err(|_| invalid(format!("Cannot parse '{}' as seconds", value)))?;
            }
            "DECOMPRESS__COMMAND" => {
                self.decompress.command = value.split_whitespace().map(str::to_string).collect();
            }
            "OUTPUT__PREFIX" => {
                self.output.prefix = PathBuf::from(value);
            }
            "OUTPUT__COMPRESSION" => {
                self.output.compression = value.parse().map_err(invalid)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Options handed to every source task
    pub fn task_options(&self) -> TaskOptions {
        TaskOptions {
            aggregate: AggregateOptions {
                policy: self.parsing.policy,
                skip_seconds: self.parsing.skip_seconds,
            },
            decompress: DecompressCommand::from_argv(&self.decompress.command)
                .unwrap_or_default(),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| TgenError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("tgenstats").join("config.toml"))
    }
}
