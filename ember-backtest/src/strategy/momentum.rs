//! Buy-and-hold of the top momentum stocks, selected once on the first bar.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use super::{ensure_positive, momentum_select, parse_params, shares_for, Strategy, StrategyArgs, StrategyError};
use crate::data::{Candle, MarketData};
use crate::engine::StrategyContext;
use crate::execution::OrderStatus;

const NAME: &str = "MomentumStrategy";

pub(crate) fn default_invest_amount() -> f64 {
    50_000.0
}

pub(crate) fn default_top_n() -> usize {
    50
}

pub(crate) fn default_lookback_days() -> usize {
    200
}

/// Parameters for [`Momentum`]
#[derive(Debug, Clone, Deserialize)]
pub struct MomentumParams {
    #[serde(default = "default_invest_amount")]
    pub invest_amount: f64,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            invest_amount: default_invest_amount(),
            top_n: default_top_n(),
            lookback_days: default_lookback_days(),
        }
    }
}

/// Selects the top-N stocks by momentum on the first bar and buys each once.
#[derive(Debug)]
pub struct Momentum {
    id: String,
    params: MomentumParams,
    selected: Vec<String>,
    target_shares: BTreeMap<String, u64>,
    bought: BTreeSet<String>,
    initialized: bool,
}

impl Momentum {
    pub fn new(params: MomentumParams) -> Self {
        Self {
            id: format!("{}-000", NAME),
            params,
            selected: Vec::new(),
            target_shares: BTreeMap::new(),
            bought: BTreeSet::new(),
            initialized: false,
        }
    }

    pub fn from_args(args: StrategyArgs<'_>) -> Result<Self, StrategyError> {
        let params: MomentumParams = parse_params(NAME, args.params)?;
        ensure_positive(NAME, "invest_amount", params.invest_amount)?;
        ensure_positive(NAME, "top_n", params.top_n)?;
        ensure_positive(NAME, "lookback_days", params.lookback_days)?;
        Ok(Self::new(params))
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn target_shares(&self) -> &BTreeMap<String, u64> {
        &self.target_shares
    }

    fn initialize(&mut self, data: &MarketData, as_of: NaiveDate) {
        self.initialized = true;
        self.selected = momentum_select(data, as_of, self.params.lookback_days, self.params.top_n);
        info!(%as_of, count = self.selected.len(), "Selected stocks");

        if self.selected.is_empty() {
            warn!(%as_of, lookback_days = self.params.lookback_days, "No stock has enough history");
            return;
        }

        let per_stock = self.params.invest_amount / self.selected.len() as f64;
        for ticker in &self.selected {
            let Some(price) = data.close_on_or_before(ticker, as_of) else {
                continue;
            };
            let shares = shares_for(per_stock, price);
            if shares > 0 {
                self.target_shares.insert(ticker.clone(), shares);
            }
        }
        info!(count = self.target_shares.len(), per_stock, "Will trade stocks");
    }
}

impl Strategy for Momentum {
    fn id(&self) -> &str {
        &self.id
    }

    fn required_instruments(&self, data: &MarketData) -> Vec<String> {
        data.stock_tickers()
    }

    fn on_start(&mut self, ctx: &mut StrategyContext) {
        let stocks = ctx.market_data().stock_tickers();
        let subscribed = stocks.iter().filter(|t| ctx.subscribe_bars(t)).count();
        info!(subscribed, universe = stocks.len(), "Subscribed to stocks");
    }

    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &Candle) {
        if !self.initialized {
            self.initialize(ctx.market_data(), bar.date());
        }

        let Some(&shares) = self.target_shares.get(&bar.symbol) else {
            return;
        };
        if !self.bought.insert(bar.symbol.clone()) {
            return;
        }
        if ctx.buy(&bar.symbol, shares) == OrderStatus::Filled {
            info!(date = %bar.date(), "Bought {} of {} @ {:.2}", shares, bar.symbol, bar.close);
        }
    }

    fn on_stop(&mut self, ctx: &mut StrategyContext) {
        let subscribed: Vec<String> = ctx.subscriptions().cloned().collect();
        for ticker in subscribed {
            ctx.unsubscribe_bars(&ticker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::{date, history, run};
    use test_case::test_case;

    fn universe() -> MarketData {
        let mut data = MarketData::default();
        // Rising fastest
        data.insert_stock(history("AAA", date(0), &[10.0, 15.0, 20.0, 20.0, 25.0]));
        // Rising
        data.insert_stock(history("BBB", date(0), &[50.0, 55.0, 60.0, 60.0, 62.0]));
        // Falling
        data.insert_stock(history("CCC", date(0), &[30.0, 25.0, 20.0, 20.0, 18.0]));
        data.insert_index(history("SPY", date(0), &[400.0, 401.0, 402.0, 403.0, 404.0]));
        data
    }

    fn momentum(yaml: &str) -> Momentum {
        let params: serde_yaml::Mapping = serde_yaml::from_str(yaml).unwrap();
        Momentum::from_args(StrategyArgs {
            ticker: "SPY",
            trade_size: 100,
            params: &params,
        })
        .unwrap()
    }

    #[test_case("lookback_days: 0", "lookback_days" ; "zero lookback")]
    #[test_case("top_n: 0", "top_n" ; "zero top n")]
    #[test_case("invest_amount: -5", "invest_amount" ; "negative amount")]
    fn test_rejects_non_positive_params(yaml: &str, expected: &str) {
        let params: serde_yaml::Mapping = serde_yaml::from_str(yaml).unwrap();
        let err = Momentum::from_args(StrategyArgs {
            ticker: "SPY",
            trade_size: 100,
            params: &params,
        })
        .unwrap_err();
        assert!(matches!(err, StrategyError::InvalidValue { ref field, .. } if field == expected));
    }

    #[test]
    fn test_required_instruments_are_stocks() {
        let data = universe();
        let strategy = momentum("{}");
        assert_eq!(strategy.required_instruments(&data), vec!["AAA", "BBB", "CCC"]);
        assert_eq!(strategy.params.invest_amount, 50_000.0);
        assert_eq!(strategy.params.top_n, 50);
        assert_eq!(strategy.params.lookback_days, 200);
    }

    #[test]
    fn test_buys_top_n_once_and_holds() {
        let data = universe();
        let strategy = momentum("invest_amount: 10000\ntop_n: 2\nlookback_days: 3");
        // Run window starts at row 2 so the lookback reaches into history.
        let result = run(Box::new(strategy), data, date(2), 100_000.0);

        // AAA: 20/10 - 1 = 1.0, BBB: 60/50 - 1 = 0.2, CCC negative
        let bought: Vec<(&str, u64, f64)> = result
            .fills
            .iter()
            .map(|f| (f.instrument.as_str(), f.quantity, f.price))
            .collect();
        assert_eq!(bought, vec![("AAA", 250, 20.0), ("BBB", 83, 60.0)]);
        assert!(result.positions.iter().all(|p| p.is_open()));
        assert!(result.fills.iter().all(|f| f.date == date(2)));
    }

    #[test]
    fn test_no_selection_without_history() {
        let data = universe();
        let strategy = momentum("lookback_days: 300");
        let result = run(Box::new(strategy), data, date(0), 100_000.0);
        assert!(result.orders.is_empty());
        assert_eq!(result.final_equity(), 100_000.0);
    }
}
