use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tgenstats
#[derive(Error, Debug)]
pub enum TgenError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// A log source could not be opened, or its decompressor could not be started
    #[error("Cannot open source {source_name}: {source}")]
    SourceOpen {
        source_name: String,
        source: std::io::Error,
    },

    /// A line matched a trigger but its fields could not be extracted
    #[error("Parse error in {source_name} at line {line}: {message}")]
    Parse {
        source_name: String,
        line: u64,
        message: String,
    },

    /// The run was interrupted
    #[error("Interrupted, processing cancelled")]
    Cancelled,

    /// Search path traversal errors
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TgenError {
    /// Whether this error ends the whole run rather than a single source
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TgenError::Cancelled)
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for tgenstats operations
pub type Result<T> = std::result::Result<T, TgenError>;
