//! Stochastic %K/%D crossover on a single instrument.

use serde::Deserialize;
use tracing::{error, info};

use super::{ensure_positive, parse_params, Strategy, StrategyArgs, StrategyError};
use crate::data::Candle;
use crate::engine::StrategyContext;
use crate::execution::OrderStatus;
use crate::indicators::{Indicator, Stochastics};

const NAME: &str = "StochCrossStrategy";

fn default_k() -> usize {
    10
}

fn default_d() -> usize {
    20
}

/// Parameters for [`StochCross`]
#[derive(Debug, Clone, Deserialize)]
pub struct StochCrossParams {
    #[serde(default = "default_k")]
    pub k_period: usize,

    #[serde(default = "default_d")]
    pub d_period: usize,

    #[serde(default)]
    pub trade_size: Option<u64>,
}

/// Long while %K is above %D.
#[derive(Debug)]
pub struct StochCross {
    id: String,
    ticker: String,
    trade_size: u64,
    stoch: Stochastics,
}

impl StochCross {
    pub fn new(ticker: impl Into<String>, params: StochCrossParams, trade_size: u64) -> Self {
        Self {
            id: format!("{}-000", NAME),
            ticker: ticker.into(),
            trade_size: params.trade_size.unwrap_or(trade_size),
            stoch: Stochastics::new(params.k_period, params.d_period),
        }
    }

    pub fn from_args(args: StrategyArgs<'_>) -> Result<Self, StrategyError> {
        let params: StochCrossParams = parse_params(NAME, args.params)?;
        ensure_positive(NAME, "k_period", params.k_period)?;
        ensure_positive(NAME, "d_period", params.d_period)?;
        Ok(Self::new(args.ticker, params, args.trade_size))
    }
}

impl Strategy for StochCross {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_start(&mut self, ctx: &mut StrategyContext) {
        if !ctx.subscribe_bars(&self.ticker) {
            error!(ticker = %self.ticker, "Instrument not found, strategy idle");
            return;
        }
        info!(ticker = %self.ticker, "Subscribed with {}", self.stoch.name());
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &Candle) {
        if bar.symbol != self.ticker {
            return;
        }
        self.stoch.handle_bar(bar);
        if !self.stoch.initialized() {
            return;
        }

        let k = self.stoch.value_k;
        let d = self.stoch.value_d;
        let is_long = ctx.portfolio().is_net_long(&self.ticker);

        if k > d && !is_long {
            if ctx.buy(&self.ticker, self.trade_size) == OrderStatus::Filled {
                info!(date = %bar.date(), k, d, "BUY {} {} @ {:.2}", self.trade_size, self.ticker, bar.close);
            }
        } else if k < d && is_long && ctx.close_all_positions(&self.ticker) == Some(OrderStatus::Filled) {
            info!(date = %bar.date(), k, d, "Closed {} @ {:.2}", self.ticker, bar.close);
        }
    }

    fn on_stop(&mut self, ctx: &mut StrategyContext) {
        ctx.close_all_positions(&self.ticker);
        ctx.unsubscribe_bars(&self.ticker);
    }
}
