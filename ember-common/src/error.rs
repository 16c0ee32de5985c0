//! Error types for the Ember backtester.

use thiserror::Error;

/// Result type alias using the Ember error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Ember crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input (dates, file contents)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
