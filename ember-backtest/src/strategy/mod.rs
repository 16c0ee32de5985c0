//! Trading strategies.
//!
//! Each strategy is a set of callbacks driven by the engine. Strategies are
//! created by name through [`StrategyRegistry`] from a YAML parameter mapping.

mod ema_cross;
mod index_hold;
mod momentum;
mod momentum_rebalance;
mod registry;
mod selector;
mod stoch;

pub use ema_cross::{EmaCross, EmaCrossParams};
pub use index_hold::{IndexHold, IndexHoldParams};
pub use momentum::{Momentum, MomentumParams};
pub use momentum_rebalance::{MomentumRebalance, MomentumRebalanceParams, RebalanceFrequency};
pub use registry::{StrategyArgs, StrategyEntry, StrategyRegistry};
pub use selector::{calculate_shares, equal_weight, momentum_scores, momentum_select};
pub use stoch::{StochCross, StochCrossParams};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::data::{Candle, MarketData};
use crate::engine::StrategyContext;

/// Strategy construction errors
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy '{name}' (available: {available})")]
    UnknownStrategy { name: String, available: String },

    #[error("invalid params for {strategy}: {source}")]
    InvalidParams {
        strategy: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {strategy}.{field}: {reason}")]
    InvalidValue {
        strategy: String,
        field: String,
        reason: String,
    },
}

/// Engine callbacks implemented by every strategy.
pub trait Strategy {
    /// Strategy ID (e.g. `EMACrossStrategy-000`)
    fn id(&self) -> &str;

    /// Instruments to load bars for in addition to the run ticker.
    fn required_instruments(&self, data: &MarketData) -> Vec<String> {
        let _ = data;
        Vec::new()
    }

    fn on_start(&mut self, ctx: &mut StrategyContext);

    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &Candle);

    fn on_stop(&mut self, ctx: &mut StrategyContext) {
        let _ = ctx;
    }
}

/// Deserialize a typed parameter struct from a YAML mapping, applying its defaults.
pub(crate) fn parse_params<T: DeserializeOwned>(
    strategy: &str,
    params: &serde_yaml::Mapping,
) -> Result<T, StrategyError> {
    serde_yaml::from_value(serde_yaml::Value::Mapping(params.clone())).map_err(|source| {
        StrategyError::InvalidParams {
            strategy: strategy.to_string(),
            source,
        }
    })
}

pub(crate) fn ensure_positive<T: PartialOrd + Default + std::fmt::Display>(
    strategy: &str,
    field: &str,
    value: T,
) -> Result<T, StrategyError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(StrategyError::InvalidValue {
            strategy: strategy.to_string(),
            field: field.to_string(),
            reason: format!("must be positive, got {}", value),
        })
    }
}

/// Whole shares affordable with `amount` at `price`.
pub(crate) fn shares_for(amount: f64, price: f64) -> u64 {
    if price > 0.0 && amount > 0.0 {
        (amount / price).floor() as u64
    } else {
        0
    }
}
