//! Configuration validation.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{Config, DataSourceConfig, ObservabilityConfig, PathsConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors into a single result.
    pub fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.paths.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.data_source.validate() {
            errors.push(e);
        }

        ValidationError::collect(errors)
    }
}

impl Validate for PathsConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(ValidationError::missing("paths.data_dir"));
        }
        if self.result_dir.trim().is_empty() {
            return Err(ValidationError::missing("paths.result_dir"));
        }
        if self.data_dir == self.result_dir {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "paths.data_dir and paths.result_dir both point to '{}'",
                    self.data_dir
                ),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        // A full EnvFilter directive (e.g. "info,ember_backtest=debug") is allowed;
        // only the base level is checked.
        let base = self.log_level.split(',').next().unwrap_or("").trim();
        if !LOG_LEVELS.contains(&base.to_lowercase().as_str()) {
            return Err(ValidationError::invalid(
                "observability.log_level",
                format!("'{}' is not one of {:?}", self.log_level, LOG_LEVELS),
            ));
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::invalid(
                "observability.log_format",
                format!("'{}' is not one of {:?}", self.log_format, LOG_FORMATS),
            ));
        }
        Ok(())
    }
}

impl Validate for DataSourceConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError::invalid(
                "data_source.base_url",
                "must start with http:// or https://",
            ));
        }
        if self.rate_limit_rpm == 0 {
            errors.push(ValidationError::invalid(
                "data_source.rate_limit_rpm",
                "must be greater than 0",
            ));
        }
        if self.batch_size == 0 {
            errors.push(ValidationError::invalid(
                "data_source.batch_size",
                "must be greater than 0",
            ));
        }
        if self.timeout_secs == 0 {
            errors.push(ValidationError::invalid(
                "data_source.timeout_secs",
                "must be greater than 0",
            ));
        }

        ValidationError::collect(errors)
    }
}
