//! Buy-and-hold of a single index ETF, used as a benchmark strategy.

use serde::Deserialize;
use tracing::{error, info, warn};

use super::momentum::default_invest_amount;
use super::{ensure_positive, parse_params, shares_for, Strategy, StrategyArgs, StrategyError};
use crate::data::{Candle, MarketData};
use crate::engine::StrategyContext;
use crate::execution::OrderStatus;

const NAME: &str = "IndexHoldStrategy";
const DEFAULT_INDEX: &str = "SPY";

/// Parameters for [`IndexHold`]
#[derive(Debug, Clone, Deserialize)]
pub struct IndexHoldParams {
    /// Instrument to hold; the run ticker when absent
    #[serde(default)]
    pub ticker: Option<String>,

    #[serde(default = "default_invest_amount")]
    pub invest_amount: f64,
}

#[derive(Debug)]
pub struct IndexHold {
    id: String,
    ticker: String,
    invest_amount: f64,
    bought: bool,
}

impl IndexHold {
    pub fn new(ticker: impl Into<String>, invest_amount: f64) -> Self {
        Self {
            id: format!("{}-000", NAME),
            ticker: ticker.into(),
            invest_amount,
            bought: false,
        }
    }

    pub fn from_args(args: StrategyArgs<'_>) -> Result<Self, StrategyError> {
        let params: IndexHoldParams = parse_params(NAME, args.params)?;
        ensure_positive(NAME, "invest_amount", params.invest_amount)?;

        let ticker = params
            .ticker
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| args.ticker.trim().to_string());
        let ticker = if ticker.is_empty() { DEFAULT_INDEX.to_string() } else { ticker };

        Ok(Self::new(ticker, params.invest_amount))
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }
}

impl Strategy for IndexHold {
    fn id(&self) -> &str {
        &self.id
    }

    fn required_instruments(&self, _data: &MarketData) -> Vec<String> {
        vec![self.ticker.clone()]
    }

    fn on_start(&mut self, ctx: &mut StrategyContext) {
        if !ctx.subscribe_bars(&self.ticker) {
            error!(ticker = %self.ticker, "Instrument not found in bar data");
        }
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &Candle) {
        if self.bought || bar.symbol != self.ticker {
            return;
        }
        self.bought = true;

        let shares = shares_for(self.invest_amount, bar.close);
        if shares == 0 {
            warn!(ticker = %self.ticker, price = bar.close, invest_amount = self.invest_amount, "Invest amount below one share");
            return;
        }
        if ctx.buy(&self.ticker, shares) == OrderStatus::Filled {
            info!(date = %bar.date(), "Bought {} {} @ ${:.2}", shares, self.ticker, bar.close);
        }
    }

    fn on_stop(&mut self, ctx: &mut StrategyContext) {
        ctx.unsubscribe_bars(&self.ticker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::{date, history, run};
    use test_case::test_case;

    fn index_hold(yaml: &str, run_ticker: &str) -> IndexHold {
        let params: serde_yaml::Mapping = serde_yaml::from_str(yaml).unwrap();
        IndexHold::from_args(StrategyArgs {
            ticker: run_ticker,
            trade_size: 100,
            params: &params,
        })
        .unwrap()
    }

    #[test_case("{}", "QQQ", "QQQ" ; "run ticker")]
    #[test_case("ticker: DIA", "QQQ", "DIA" ; "explicit ticker")]
    #[test_case("{}", "", "SPY" ; "fallback")]
    fn test_ticker_resolution(yaml: &str, run_ticker: &str, expected: &str) {
        assert_eq!(index_hold(yaml, run_ticker).ticker(), expected);
    }

    #[test]
    fn test_buys_once_on_first_bar() {
        let mut data = MarketData::default();
        data.insert_index(history("SPY", date(0), &[400.0, 420.0, 440.0]));

        let strategy = index_hold("invest_amount: 10000", "SPY");
        let result = run(Box::new(strategy), data, date(0), 100_000.0);

        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].quantity, 25);
        assert_eq!(result.fills[0].price, 400.0);
        // 90000 cash + 25 * 440
        assert_eq!(result.final_equity(), 101_000.0);
    }
}
