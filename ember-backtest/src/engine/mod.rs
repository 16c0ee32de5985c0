//! Event-driven daily-bar backtest engine.
//!
//! One venue, one cash account, one strategy. Each trading day the engine
//! marks every instrument to its close, then dispatches `on_bar` for each
//! subscribed instrument in ticker order, then records an account snapshot.

mod context;

pub use context::StrategyContext;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::data::{Candle, MarketData};
use crate::execution::{AccountSnapshot, CashAccount, MarketOrder, OrderFill, OrderStatus, Position};
use crate::strategy::Strategy;

// ============================================================================
// Configuration
// ============================================================================

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub trader_id: String,
    pub venue: String,
    pub base_currency: String,
    pub starting_cash: f64,
    /// Commission as a fraction of notional
    pub commission_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trader_id: "BACKTESTER-001".to_string(),
            venue: "NYSE".to_string(),
            base_currency: "USD".to_string(),
            starting_cash: 100_000.0,
            commission_rate: 0.0,
        }
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no strategy added")]
    NoStrategy,

    #[error("strategy {0} already added; one strategy per run")]
    StrategyAlreadyAdded(String),

    #[error("no bar data added")]
    NoData,

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// Result
// ============================================================================

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub trader_id: String,
    pub venue: String,
    pub strategy_id: String,
    pub currency: String,
    pub starting_cash: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Bars processed
    pub iterations: usize,
    pub snapshots: Vec<AccountSnapshot>,
    pub orders: Vec<MarketOrder>,
    pub fills: Vec<OrderFill>,
    /// Closed and open positions, ordered by open date
    pub positions: Vec<Position>,
    pub total_commissions: f64,
}

impl BacktestResult {
    /// `(date, total)` per snapshot.
    pub fn equity_curve(&self) -> Vec<(NaiveDate, f64)> {
        self.snapshots.iter().map(|s| (s.date, s.total)).collect()
    }

    pub fn final_equity(&self) -> f64 {
        self.snapshots
            .last()
            .map_or(self.starting_cash, |s| s.total)
    }

    pub fn total_pnl(&self) -> f64 {
        self.final_equity() - self.starting_cash
    }

    pub fn closed_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_closed())
    }

    pub fn denied_orders(&self) -> usize {
        self.orders
            .iter()
            .filter(|o| o.status == OrderStatus::Denied)
            .count()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Daily-bar backtest engine.
pub struct BacktestEngine {
    config: EngineConfig,
    bars: BTreeMap<String, Vec<Candle>>,
    market_data: Arc<MarketData>,
    strategy: Option<Box<dyn Strategy>>,
}

impl BacktestEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            bars: BTreeMap::new(),
            market_data: Arc::new(MarketData::default()),
            strategy: None,
        }
    }

    /// History strategies may look at (lookbacks reach before the first bar).
    pub fn with_market_data(mut self, market_data: Arc<MarketData>) -> Self {
        self.market_data = market_data;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register an instrument and its bars.
    pub fn add_data(&mut self, symbol: &str, candles: Vec<Candle>) {
        let entry = self.bars.entry(symbol.to_string()).or_default();
        entry.extend(candles);
        entry.sort_by_key(|c| c.timestamp);
        entry.dedup_by_key(|c| c.date());
        debug!(symbol, bars = entry.len(), "Added bar data");
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) -> Result<(), EngineError> {
        if let Some(existing) = &self.strategy {
            return Err(EngineError::StrategyAlreadyAdded(existing.id().to_string()));
        }
        self.strategy = Some(strategy);
        Ok(())
    }

    pub fn instruments(&self) -> Vec<String> {
        self.bars.keys().cloned().collect()
    }

    pub fn bar_count(&self) -> usize {
        self.bars.values().map(Vec::len).sum()
    }

    /// Run the strategy over every added bar.
    pub fn run(&mut self) -> Result<BacktestResult, EngineError> {
        if !(self.config.starting_cash.is_finite() && self.config.starting_cash > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "starting cash must be positive, got {}",
                self.config.starting_cash
            )));
        }
        if self.bars.is_empty() {
            return Err(EngineError::NoData);
        }
        let mut strategy = self.strategy.take().ok_or(EngineError::NoStrategy)?;

        let mut timeline: BTreeMap<NaiveDate, Vec<&Candle>> = BTreeMap::new();
        for candles in self.bars.values() {
            for candle in candles {
                timeline.entry(candle.date()).or_default().push(candle);
            }
        }

        let account = CashAccount::new(
            format!("{}-001", self.config.venue),
            self.config.base_currency.as_str(),
            self.config.starting_cash,
        );
        let instruments: BTreeSet<String> = self.bars.keys().cloned().collect();
        let mut ctx = StrategyContext::new(
            strategy.id(),
            account,
            self.config.commission_rate,
            instruments,
            Arc::clone(&self.market_data),
        );

        info!(
            trader_id = %self.config.trader_id,
            venue = %self.config.venue,
            strategy = strategy.id(),
            instruments = self.bars.len(),
            days = timeline.len(),
            starting_cash = self.config.starting_cash,
            "Starting backtest"
        );

        strategy.on_start(&mut ctx);

        let mut snapshots: Vec<AccountSnapshot> = Vec::with_capacity(timeline.len());
        let mut iterations = 0usize;

        for (date, day) in &timeline {
            ctx.set_date(*date);
            for bar in day {
                ctx.update_price(&bar.symbol, bar.close);
            }
            for bar in day {
                iterations += 1;
                if ctx.is_subscribed(&bar.symbol) {
                    strategy.on_bar(&mut ctx, bar);
                }
            }
            if let Some(snapshot) = ctx.snapshot() {
                snapshots.push(snapshot);
            }
        }

        strategy.on_stop(&mut ctx);
        // Closing fills in on_stop happen on the last date.
        if let (Some(last), Some(snapshot)) = (snapshots.last_mut(), ctx.snapshot()) {
            *last = snapshot;
        }

        let total_commissions = ctx.account().commissions();
        let strategy_id = strategy.id().to_string();
        let (orders, fills, portfolio) = ctx.into_parts();

        let result = BacktestResult {
            trader_id: self.config.trader_id.clone(),
            venue: self.config.venue.clone(),
            strategy_id,
            currency: self.config.base_currency.clone(),
            starting_cash: self.config.starting_cash,
            start_date: timeline.keys().next().copied(),
            end_date: timeline.keys().next_back().copied(),
            iterations,
            snapshots,
            orders,
            fills,
            positions: portfolio.all_positions(),
            total_commissions,
        };

        info!(
            strategy = %result.strategy_id,
            iterations = result.iterations,
            orders = result.orders.len(),
            denied = result.denied_orders(),
            fills = result.fills.len(),
            final_equity = result.final_equity(),
            "Backtest complete"
        );

        Ok(result)
    }
}

// ============================================================================
// Tests
// ============================================================================
