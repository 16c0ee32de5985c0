//! EMA crossover on a single instrument.

use serde::Deserialize;
use tracing::{debug, error, info};

use super::{ensure_positive, parse_params, shares_for, Strategy, StrategyArgs, StrategyError};
use crate::data::Candle;
use crate::engine::StrategyContext;
use crate::execution::OrderStatus;
use crate::indicators::{ExponentialMovingAverage, Indicator};

const NAME: &str = "EMACrossStrategy";

fn default_fast() -> usize {
    10
}

fn default_slow() -> usize {
    20
}

/// Parameters for [`EmaCross`]
#[derive(Debug, Clone, Deserialize)]
pub struct EmaCrossParams {
    #[serde(default = "default_fast")]
    pub fast_ema_period: usize,

    #[serde(default = "default_slow")]
    pub slow_ema_period: usize,

    /// Shares per entry; the run's trade size when absent
    #[serde(default)]
    pub trade_size: Option<u64>,

    /// Size each entry as `floor(invest_amount / close)` instead of a fixed size
    #[serde(default)]
    pub invest_amount: Option<f64>,
}

/// Goes long when the fast EMA is above the slow EMA, flattens when below.
#[derive(Debug)]
pub struct EmaCross {
    id: String,
    ticker: String,
    trade_size: u64,
    invest_amount: Option<f64>,
    fast_ema: ExponentialMovingAverage,
    slow_ema: ExponentialMovingAverage,
}

impl EmaCross {
    pub fn new(ticker: impl Into<String>, params: EmaCrossParams, trade_size: u64) -> Self {
        Self {
            id: format!("{}-000", NAME),
            ticker: ticker.into(),
            trade_size: params.trade_size.unwrap_or(trade_size),
            invest_amount: params.invest_amount,
            fast_ema: ExponentialMovingAverage::new(params.fast_ema_period),
            slow_ema: ExponentialMovingAverage::new(params.slow_ema_period),
        }
    }

    pub fn from_args(args: StrategyArgs<'_>) -> Result<Self, StrategyError> {
        let params: EmaCrossParams = parse_params(NAME, args.params)?;
        ensure_positive(NAME, "fast_ema_period", params.fast_ema_period)?;
        ensure_positive(NAME, "slow_ema_period", params.slow_ema_period)?;
        if let Some(amount) = params.invest_amount {
            ensure_positive(NAME, "invest_amount", amount)?;
        }
        Ok(Self::new(args.ticker, params, args.trade_size))
    }

    fn entry_size(&self, price: f64) -> u64 {
        match self.invest_amount {
            Some(amount) => shares_for(amount, price),
            None => self.trade_size,
        }
    }
}

impl Strategy for EmaCross {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_start(&mut self, ctx: &mut StrategyContext) {
        if !ctx.subscribe_bars(&self.ticker) {
            error!(ticker = %self.ticker, "Instrument not found, strategy idle");
            return;
        }
        info!(
            ticker = %self.ticker,
            "Subscribed with EMA({}, {})",
            self.fast_ema.period,
            self.slow_ema.period
        );
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &Candle) {
        if bar.symbol != self.ticker {
            return;
        }
        self.fast_ema.handle_bar(bar);
        self.slow_ema.handle_bar(bar);

        if !self.fast_ema.initialized() || !self.slow_ema.initialized() {
            return;
        }

        let fast = self.fast_ema.value;
        let slow = self.slow_ema.value;
        let is_long = ctx.portfolio().is_net_long(&self.ticker);

        if fast > slow && !is_long {
            let size = self.entry_size(bar.close);
            if size == 0 {
                debug!(ticker = %self.ticker, price = bar.close, "Entry size is zero, skipping");
                return;
            }
            if ctx.buy(&self.ticker, size) == OrderStatus::Filled {
                info!(date = %bar.date(), fast, slow, "BUY {} {} @ {:.2} (golden cross)", size, self.ticker, bar.close);
            }
        } else if fast < slow && is_long {
            let held = ctx.portfolio().net_quantity(&self.ticker);
            if ctx.close_all_positions(&self.ticker) == Some(OrderStatus::Filled) {
                info!(date = %bar.date(), fast, slow, "SELL {} {} @ {:.2} (death cross)", held, self.ticker, bar.close);
            }
        }
    }

    fn on_stop(&mut self, ctx: &mut StrategyContext) {
        ctx.close_all_positions(&self.ticker);
        ctx.unsubscribe_bars(&self.ticker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MarketData;
    use crate::execution::OrderSide;
    use crate::strategy::testing::{date, history, run};

    fn params(yaml: &str) -> serde_yaml::Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn strategy(yaml: &str) -> EmaCross {
        let params = params(yaml);
        EmaCross::from_args(StrategyArgs {
            ticker: "AAPL",
            trade_size: 10,
            params: &params,
        })
        .unwrap()
    }

    #[test]
    fn test_params_defaults() {
        let s = strategy("{}");
        assert_eq!(s.fast_ema.period, 10);
        assert_eq!(s.slow_ema.period, 20);
        assert_eq!(s.trade_size, 10);
        assert_eq!(s.entry_size(50.0), 10);

        let s = strategy("invest_amount: 1000\nunknown_key: 1");
        assert_eq!(s.entry_size(300.0), 3);
    }

    #[test]
    fn test_zero_period_rejected() {
        let params = params("fast_ema_period: 0");
        let err = EmaCross::from_args(StrategyArgs {
            ticker: "AAPL",
            trade_size: 10,
            params: &params,
        })
        .unwrap_err();
        assert!(matches!(err, StrategyError::InvalidValue { .. }));
    }

    #[test]
    fn test_enters_on_rise_and_exits_on_fall() {
        let mut closes: Vec<f64> = vec![100.0; 3];
        closes.extend([101.0, 103.0, 106.0, 110.0]);
        closes.extend([105.0, 98.0, 90.0, 85.0]);

        let mut data = MarketData::default();
        data.insert_stock(history("AAPL", date(0), &closes));

        let strategy = strategy("fast_ema_period: 2\nslow_ema_period: 3");
        let result = run(Box::new(strategy), data, date(0), 100_000.0);

        let sides: Vec<OrderSide> = result.fills.iter().map(|f| f.side).collect();
        assert_eq!(sides, vec![OrderSide::Buy, OrderSide::Sell]);
        assert_eq!(result.fills[0].quantity, 10);
        assert_eq!(result.fills[0].price, 101.0);
        assert!(result.positions.iter().all(|p| p.is_closed()));
    }

    #[test]
    fn test_on_stop_closes_open_position() {
        let closes = [100.0, 100.0, 100.0, 105.0, 110.0];
        let mut data = MarketData::default();
        data.insert_stock(history("AAPL", date(0), &closes));

        let strategy = strategy("fast_ema_period: 2\nslow_ema_period: 3");
        let result = run(Box::new(strategy), data, date(0), 100_000.0);

        assert_eq!(result.fills.len(), 2);
        assert_eq!(result.fills[1].side, OrderSide::Sell);
        assert_eq!(result.fills[1].price, 110.0);
        assert_eq!(result.fills[1].date, date(4));
    }
}
