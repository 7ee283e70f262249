use crate::config::Config;
use crate::error::{Result, TgenError, ValidationError};
use regex::Regex;

/// Upper bound on worker threads, well past any real core count
const MAX_WORKERS: usize = 1024;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every problem at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_discovery(config, &mut errors);
        Self::validate_dispatch(config, &mut errors);
        Self::validate_decompress(config, &mut errors);
        Self::validate_output(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TgenError::ConfigValidation { errors })
        }
    }

    fn validate_discovery(config: &Config, errors: &mut Vec<ValidationError>) {
        let patterns = &config.discovery.patterns;
        if patterns.is_empty() {
            errors.push(ValidationError::new(
                "discovery.patterns",
                "At least one file name pattern is required",
            ));
        }

        for pattern in patterns {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ValidationError::new(
                    "discovery.patterns",
                    format!("Invalid pattern '{}': {}", pattern, e),
                ));
            }
        }
    }

    fn validate_dispatch(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.dispatch.workers > MAX_WORKERS {
            errors.push(ValidationError::new(
                "dispatch.workers",
                format!(
                    "Worker count {} exceeds the maximum of {}",
                    config.dispatch.workers, MAX_WORKERS
                ),
            ));
        }
    }

    fn validate_decompress(config: &Config, errors: &mut Vec<ValidationError>) {
        match config.decompress.command.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => errors.push(ValidationError::new(
                "decompress.command",
                "Decompressor command cannot be empty",
            )),
        }
    }

    fn validate_output(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.output.prefix.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "output.prefix",
                "Output prefix cannot be empty",
            ));
        }
    }
}
