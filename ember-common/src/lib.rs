//! Ember Common - Shared types, utilities, and configuration for the Ember backtester.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup
//! - Small utilities (dates, file names, formatting)

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{Config, DataSourceConfig, ObservabilityConfig, PathsConfig};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

