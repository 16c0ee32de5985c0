//! Run configuration (`config.yaml`).

use chrono::NaiveDate;
use ember_common::{Validate, ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::path::Path;

use ember_common::{Error, Result};

// ============================================================================
// Strategy Selection
// ============================================================================

/// Which strategy to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySelection {
    /// Registry name (`ema_cross`); also used in the result directory name
    pub name: String,

    /// Informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Class-style alias tried when `name` is not registered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_class: Option<String>,
}

// ============================================================================
// Run Configuration
// ============================================================================

/// One backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub strategy: StrategySelection,

    /// Primary instrument
    pub ticker: String,

    pub start_date: NaiveDate,

    /// Inclusive
    pub end_date: NaiveDate,

    #[serde(default = "default_starting_cash")]
    pub starting_cash: f64,

    /// Default order size in shares
    #[serde(default = "default_trade_size")]
    pub trade_size: u64,

    /// Commission as a fraction of notional
    #[serde(default)]
    pub commission_rate: f64,

    /// Strategy-specific parameters
    #[serde(default)]
    pub params: Mapping,
}

fn default_starting_cash() -> f64 {
    100_000.0
}

fn default_trade_size() -> u64 {
    100
}

impl RunConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::from(e).with_context(format!("reading {}", path.display())))?;
        Self::from_yaml(&content)
            .map_err(|e| e.with_context(format!("parsing {}", path.display())))
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// `{strategy}_{ticker}`
    pub fn result_name(&self) -> String {
        format!("{}_{}", self.strategy.name, self.ticker)
    }

    /// Params rendered on one line for logs.
    pub fn params_summary(&self) -> String {
        if self.params.is_empty() {
            return "{}".to_string();
        }
        let pairs: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}: {}", yaml_scalar(k), yaml_scalar(v)))
            .collect();
        format!("{{{}}}", pairs.join(", "))
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

impl Validate for RunConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.strategy.name.trim().is_empty() {
            errors.push(ValidationError::missing("strategy.name"));
        }
        if self.ticker.trim().is_empty() {
            errors.push(ValidationError::missing("ticker"));
        }
        if self.end_date < self.start_date {
            errors.push(ValidationError::invalid(
                "end_date",
                format!("{} is before start_date {}", self.end_date, self.start_date),
            ));
        }
        if !(self.starting_cash.is_finite() && self.starting_cash > 0.0) {
            errors.push(ValidationError::invalid(
                "starting_cash",
                format!("must be positive, got {}", self.starting_cash),
            ));
        }
        if !(0.0..1.0).contains(&self.commission_rate) {
            errors.push(ValidationError::invalid(
                "commission_rate",
                format!("must be in [0, 1), got {}", self.commission_rate),
            ));
        }

        ValidationError::collect(errors)
    }
}

// ============================================================================
// Tests
// ============================================================================
