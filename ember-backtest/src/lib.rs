//! Ember Backtest Library
//!
//! Config-driven daily-bar backtesting for US equities and indices.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    ember-backtest (CLI)                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │  Market Data │──▶│  Engine +    │──▶│  Reports             │  │
//! │  │  (CSV/Yahoo) │   │  Strategies  │   │  (CSV/JSON/HTML)     │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Data
//! - Daily OHLCV bars, one CSV per ticker under `data/stock/` and `data/index/`
//! - Downloaded in rate-limited batches when the store is empty
//!
//! ## Engine
//! - One venue, one cash account, market orders filled at the last close
//! - Strategies are callbacks (`on_start`, `on_bar`, `on_stop`)
//!
//! ## Strategies
//! - `ema_cross`, `stoch`: single-instrument crossovers
//! - `momentum`, `momentum_rebalance`: top-N momentum portfolios
//! - `index_hold`: buy-and-hold benchmark

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod backtest;
pub mod data;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod strategy;

pub use backtest::{run_backtest, BacktestRunner, RunConfig, RunOutcome};
pub use engine::{BacktestEngine, BacktestResult, EngineConfig};
pub use strategy::{Strategy, StrategyRegistry};
