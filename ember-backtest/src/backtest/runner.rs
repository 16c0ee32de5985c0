//! Config-driven backtest run: data, engine, strategy, reports.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use ember_common::util::preview_list;
use ember_common::{Config, Validate};

use crate::data::{load_tickers, DataProvider, Downloader, LocalStorage, MarketData, YahooProvider};
use crate::engine::{BacktestEngine, BacktestResult, EngineConfig};
use crate::strategy::{StrategyArgs, StrategyRegistry};

use super::config::RunConfig;
use super::metrics::{returns, PerformanceStats, TradeStats};
use super::report::{
    account_rows, format_account_table, format_fills_table, format_positions_table, format_summary,
    order_fill_rows, position_rows, write_csv,
};
use super::tearsheet::TearSheet;

/// Tickers listed when the run ticker is missing from local data.
const MISSING_TICKER_PREVIEW: usize = 10;

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: BacktestResult,
    pub result_dir: PathBuf,
    pub performance: PerformanceStats,
    pub trades: TradeStats,
    /// Whether `report.html` was written
    pub html_report: bool,
}

/// `summary.json`
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    strategy: &'a str,
    strategy_id: &'a str,
    ticker: &'a str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    starting_cash: f64,
    final_equity: f64,
    total_pnl: f64,
    total_commissions: f64,
    orders: usize,
    denied_orders: usize,
    performance: &'a PerformanceStats,
    trades: &'a TradeStats,
    benchmark: Option<PerformanceStats>,
}

/// Runs backtests against the configured data and result directories.
pub struct BacktestRunner {
    config: Config,
    registry: StrategyRegistry,
    provider: Option<Arc<dyn DataProvider>>,
}

impl BacktestRunner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: StrategyRegistry::new(),
            provider: None,
        }
    }

    /// Use `provider` instead of Yahoo when the data directory must be filled.
    pub fn with_provider(mut self, provider: Arc<dyn DataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Run the backtest described by the YAML file at `run_config_path`.
    ///
    /// Returns `Ok(None)` when the run ticker has no local data.
    pub async fn run(&self, run_config_path: &Path) -> Result<Option<RunOutcome>> {
        let run = RunConfig::load(run_config_path)?;
        self.run_config(&run).await
    }

    pub async fn run_config(&self, run: &RunConfig) -> Result<Option<RunOutcome>> {
        self.config.validate().context("invalid application config")?;
        run.validate().context("invalid run config")?;

        info!(
            strategy = %run.strategy.name,
            ticker = %run.ticker,
            "Running {} strategy on {}",
            run.strategy.name,
            run.ticker
        );
        info!("Date range: {} to {}", run.start_date, run.end_date);
        info!("Parameters: {}", run.params_summary());

        let storage = LocalStorage::new(self.config.paths.data_dir());
        if storage.is_empty() {
            warn!(dir = %storage.root().display(), "No data found. Downloading...");
            self.download_universe(&storage, run).await?;
        }
        let data = Arc::new(storage.load()?);

        if !data.contains(&run.ticker) {
            warn!(
                ticker = %run.ticker,
                "Ticker {} not found in data. Available: {}",
                run.ticker,
                preview_list(&data.tickers(), MISSING_TICKER_PREVIEW)
            );
            return Ok(None);
        }

        let strategy = self
            .registry
            .create(
                &run.strategy.name,
                run.strategy.class.as_deref(),
                StrategyArgs {
                    ticker: &run.ticker,
                    trade_size: run.trade_size,
                    params: &run.params,
                },
            )
            .context("creating strategy")?;

        let mut engine = BacktestEngine::new(EngineConfig {
            starting_cash: run.starting_cash,
            commission_rate: run.commission_rate,
            ..Default::default()
        })
        .with_market_data(Arc::clone(&data));

        let mut instruments: BTreeSet<String> = strategy.required_instruments(&data).into_iter().collect();
        instruments.insert(run.ticker.clone());
        let loaded = add_bars(&mut engine, &data, &instruments, run.start_date, run.end_date);
        info!(
            instruments = loaded,
            bars = engine.bar_count(),
            "Loaded {} daily bars for {}",
            engine.bar_count(),
            run.ticker
        );

        engine.add_strategy(strategy)?;
        let result = engine.run().context("backtest failed")?;

        println!("\n=== Account Report ===");
        print!("{}", format_account_table(&result));
        println!("\n=== Positions Report ===");
        print!("{}", format_positions_table(&result));
        println!("\n=== Order Fills Report ===");
        print!("{}", format_fills_table(&result));

        let outcome = self.write_results(run, &data, result)?;
        println!("\n{}", format_summary(&outcome.result, &outcome.performance, &outcome.trades));
        Ok(Some(outcome))
    }

    async fn download_universe(&self, storage: &LocalStorage, run: &RunConfig) -> Result<()> {
        let tickers = load_tickers(&self.config.paths.ticker_file())?;
        let provider: Arc<dyn DataProvider> = match &self.provider {
            Some(provider) => Arc::clone(provider),
            None => Arc::new(YahooProvider::from_config(&self.config.data_source)),
        };
        let downloader = Downloader::from_config(provider, &self.config.data_source);

        // Provider end dates are exclusive.
        let end = run.end_date.succ_opt().unwrap_or(run.end_date);
        let report = downloader.download_stocks(&tickers, run.start_date, end).await;
        storage.save_stocks(&report.data)?;
        Ok(())
    }

    fn write_results(&self, run: &RunConfig, data: &MarketData, result: BacktestResult) -> Result<RunOutcome> {
        let result_dir = self.config.paths.result_dir().join(run.result_name());
        std::fs::create_dir_all(&result_dir)
            .with_context(|| format!("creating {}", result_dir.display()))?;

        write_csv(&result_dir.join("account.csv"), &account_rows(&result))?;
        write_csv(&result_dir.join("positions.csv"), &position_rows(&result))?;
        write_csv(&result_dir.join("order_fills.csv"), &order_fill_rows(&result))?;
        std::fs::write(result_dir.join("config.yaml"), run.to_yaml()?)
            .context("writing config.yaml")?;

        let equity = result.equity_curve();
        let performance = PerformanceStats::from_equity(&equity);
        let trades = TradeStats::from_positions(result.closed_positions());
        let benchmark = benchmark_curve(data, &run.ticker, &equity);

        let rets = returns(&equity);
        let html_report = rets.len() > 1;
        if html_report {
            let title = format!("{} {} Strategy", run.ticker, run.strategy.name.to_uppercase());
            TearSheet::new(title, equity.clone())
                .with_benchmark(run.ticker.as_str(), benchmark.clone())
                .write(&result_dir.join("report.html"))?;
            info!(dir = %result_dir.display(), "Results saved");
        } else {
            warn!(
                returns = rets.len(),
                "Not enough data to generate HTML report (returns length: {})",
                rets.len()
            );
            info!(dir = %result_dir.display(), "CSV reports saved");
        }

        let summary = RunSummary {
            strategy: &run.strategy.name,
            strategy_id: &result.strategy_id,
            ticker: &run.ticker,
            start_date: result.start_date,
            end_date: result.end_date,
            starting_cash: result.starting_cash,
            final_equity: result.final_equity(),
            total_pnl: result.total_pnl(),
            total_commissions: result.total_commissions,
            orders: result.orders.len(),
            denied_orders: result.denied_orders(),
            performance: &performance,
            trades: &trades,
            benchmark: (benchmark.len() > 1).then(|| PerformanceStats::from_equity(&benchmark)),
        };
        std::fs::write(result_dir.join("summary.json"), serde_json::to_string_pretty(&summary)?)
            .context("writing summary.json")?;

        Ok(RunOutcome {
            result,
            result_dir,
            performance,
            trades,
            html_report,
        })
    }
}

/// Register bars within `[start, end]` for every instrument that has any.
fn add_bars(
    engine: &mut BacktestEngine,
    data: &MarketData,
    instruments: &BTreeSet<String>,
    start: NaiveDate,
    end: NaiveDate,
) -> usize {
    let mut loaded = 0;
    for ticker in instruments {
        let Some(history) = data.get(ticker) else {
            warn!(%ticker, "No data for instrument");
            continue;
        };
        let bars = history.between(start, end);
        if bars.is_empty() {
            continue;
        }
        engine.add_data(ticker, bars.to_vec());
        loaded += 1;
    }
    loaded
}

/// Closes of `ticker` on the dates of the equity curve.
fn benchmark_curve(data: &MarketData, ticker: &str, equity: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    equity
        .iter()
        .filter_map(|(date, _)| data.close_on_or_before(ticker, *date).map(|c| (*date, c)))
        .collect()
}

/// Run the backtest described by `run_config_path` with default providers.
pub async fn run_backtest(config: &Config, run_config_path: &Path) -> Result<Option<RunOutcome>> {
    BacktestRunner::new(config.clone()).run(run_config_path).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Candle, PriceHistory};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn history(symbol: &str, closes: &[(u32, f64)]) -> PriceHistory {
        let candles = closes
            .iter()
            .map(|(day, c)| Candle::daily(symbol, d(*day), *c, *c, *c, *c, 1_000.0))
            .collect();
        PriceHistory::new(symbol, candles)
    }

    #[test]
    fn test_add_bars_filters_window_and_missing() {
        let mut data = MarketData::default();
        data.insert_stock(history("AAPL", &[(2, 1.0), (3, 2.0), (4, 3.0), (5, 4.0)]));
        data.insert_stock(history("MSFT", &[(10, 1.0)]));

        let mut engine = BacktestEngine::new(EngineConfig::default());
        let instruments: BTreeSet<String> = ["AAPL", "MSFT", "NVDA"].iter().map(|s| s.to_string()).collect();
        let loaded = add_bars(&mut engine, &data, &instruments, d(3), d(4));

        assert_eq!(loaded, 1);
        assert_eq!(engine.instruments(), vec!["AAPL"]);
        assert_eq!(engine.bar_count(), 2);
    }

    #[test]
    fn test_benchmark_curve_uses_last_close() {
        let mut data = MarketData::default();
        data.insert_index(history("SPY", &[(2, 100.0), (4, 104.0)]));
        let equity = vec![(d(1), 1.0), (d(2), 1.0), (d(3), 1.0), (d(4), 1.0)];

        let curve = benchmark_curve(&data, "SPY", &equity);
        assert_eq!(curve, vec![(d(2), 100.0), (d(3), 100.0), (d(4), 104.0)]);
    }
}
