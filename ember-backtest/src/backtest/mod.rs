//! Config-driven backtest runs and their reports.
//!
//! A run reads a [`RunConfig`], backtests one strategy against the local CSV
//! store, and writes everything under `result/{strategy}_{ticker}/`:
//!
//! - `account.csv`, `positions.csv`, `order_fills.csv`
//! - `config.yaml` (the run config as executed)
//! - `summary.json` (performance and trade statistics)
//! - `report.html` (tear sheet, when there are at least two returns)

mod config;
mod metrics;
mod report;
mod runner;
mod tearsheet;

pub use config::{RunConfig, StrategySelection};
pub use metrics::{drawdowns, monthly_returns, returns, PerformanceStats, TradeStats, TRADING_DAYS};
pub use report::{
    account_rows, format_account_table, format_fills_table, format_positions_table, format_summary,
    order_fill_rows, position_rows, write_csv, AccountRow, OrderFillRow, PositionRow,
};
pub use runner::{run_backtest, BacktestRunner, RunOutcome};
pub use tearsheet::TearSheet;
