//! End-to-end backtest runs against a temporary data and result directory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use tempfile::TempDir;

use ember_backtest::data::{Candle, DataProvider, ProviderError};
use ember_backtest::BacktestRunner;
use ember_common::Config;

// ============================================================================
// Fixtures
// ============================================================================

const SPY_CSV: &str = "\
Date,Open,High,Low,Close,Volume
2024-01-02,399.0,401.0,398.0,400.0,1000000
2024-01-03,403.0,405.0,402.0,404.0,1000000
2024-01-04,407.0,409.0,406.0,408.0,1000000
2024-01-05,411.0,413.0,410.0,412.0,1000000
2024-01-08,415.0,417.0,414.0,416.0,1000000
";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn app_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.data_dir = root.join("data").to_string_lossy().into_owned();
    config.paths.result_dir = root.join("result").to_string_lossy().into_owned();
    config.paths.ticker_file = root.join("tickers.yaml").to_string_lossy().into_owned();
    config
}

fn write_stock(root: &Path, ticker: &str, csv: &str) {
    let dir = root.join("data").join("stock");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{}.csv", ticker)), csv).unwrap();
}

fn write_run_config(root: &Path, body: &str) -> PathBuf {
    let path = root.join("config.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

const INDEX_HOLD_RUN: &str = "\
strategy:
  name: index_hold
  class: IndexHoldStrategy
ticker: SPY
start_date: 2024-01-01
end_date: 2024-01-31
params:
  invest_amount: 10000
";

/// Returns a flat series of weekday candles and records the requested range.
struct MockProvider {
    requests: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl MockProvider {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DataProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_daily_candles(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((symbol.to_string(), start_date, end_date));

        if symbol == "BROKEN" {
            return Err(ProviderError::DataNotAvailable(symbol.to_string()));
        }
        Ok(start_date
            .iter_days()
            .take_while(|date| *date < end_date)
            .filter(|date| !matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
            .map(|date| Candle::daily(symbol, date, 50.0, 50.0, 50.0, 50.0, 1_000.0))
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_run_writes_all_reports() {
    let tmp = TempDir::new().unwrap();
    write_stock(tmp.path(), "SPY", SPY_CSV);
    let run_config = write_run_config(tmp.path(), INDEX_HOLD_RUN);

    let outcome = BacktestRunner::new(app_config(tmp.path()))
        .run(&run_config)
        .await
        .unwrap()
        .expect("SPY is in the data directory");

    let dir = tmp.path().join("result").join("index_hold_SPY");
    assert_eq!(outcome.result_dir, dir);
    for file in [
        "account.csv",
        "positions.csv",
        "order_fills.csv",
        "config.yaml",
        "summary.json",
        "report.html",
    ] {
        assert!(dir.join(file).is_file(), "missing {}", file);
    }
    assert!(outcome.html_report);

    // 25 shares bought at 400, held to 416
    assert_eq!(outcome.result.fills.len(), 1);
    assert_eq!(outcome.result.fills[0].quantity, 25);
    assert_eq!(outcome.result.final_equity(), 100_400.0);
    assert_eq!(outcome.result.snapshots.len(), 5);

    let account = std::fs::read_to_string(dir.join("account.csv")).unwrap();
    assert_eq!(account.lines().count(), 6);
    assert!(account.lines().next().unwrap().contains("total"));

    let fills = std::fs::read_to_string(dir.join("order_fills.csv")).unwrap();
    assert_eq!(fills.lines().count(), 2);
    assert!(fills.contains("SPY.NYSE"));

    let html = std::fs::read_to_string(dir.join("report.html")).unwrap();
    assert!(html.contains("SPY INDEX_HOLD Strategy"));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["ticker"], "SPY");
    assert_eq!(summary["denied_orders"], 0);
    assert_eq!(summary["final_equity"], 100_400.0);

    let saved = std::fs::read_to_string(dir.join("config.yaml")).unwrap();
    assert!(saved.contains("invest_amount: 10000"));
}

#[tokio::test]
async fn test_single_day_skips_html_report() {
    let tmp = TempDir::new().unwrap();
    write_stock(tmp.path(), "SPY", SPY_CSV);
    let run_config = write_run_config(
        tmp.path(),
        &INDEX_HOLD_RUN.replace("end_date: 2024-01-31", "end_date: 2024-01-03"),
    );

    let outcome = BacktestRunner::new(app_config(tmp.path()))
        .run(&run_config)
        .await
        .unwrap()
        .unwrap();

    // two snapshots give a single return
    assert_eq!(outcome.result.snapshots.len(), 2);
    assert!(!outcome.html_report);
    assert!(!outcome.result_dir.join("report.html").exists());
    assert!(outcome.result_dir.join("account.csv").is_file());
}

#[tokio::test]
async fn test_missing_ticker_returns_none() {
    let tmp = TempDir::new().unwrap();
    write_stock(tmp.path(), "SPY", SPY_CSV);
    let run_config = write_run_config(tmp.path(), &INDEX_HOLD_RUN.replace("ticker: SPY", "ticker: MSFT"));

    let outcome = BacktestRunner::new(app_config(tmp.path()))
        .run(&run_config)
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert!(!tmp.path().join("result").exists());
}

#[tokio::test]
async fn test_unknown_strategy_is_an_error() {
    let tmp = TempDir::new().unwrap();
    write_stock(tmp.path(), "SPY", SPY_CSV);
    let run_config = write_run_config(
        tmp.path(),
        &INDEX_HOLD_RUN
            .replace("name: index_hold", "name: mean_reversion")
            .replace("class: IndexHoldStrategy", "class: MeanReversionStrategy"),
    );

    let err = BacktestRunner::new(app_config(tmp.path()))
        .run(&run_config)
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("unknown strategy 'mean_reversion'"));
}

#[tokio::test]
async fn test_invalid_run_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write_stock(tmp.path(), "SPY", SPY_CSV);
    let run_config = write_run_config(
        tmp.path(),
        &INDEX_HOLD_RUN.replace("end_date: 2024-01-31", "end_date: 2023-12-31"),
    );

    let err = BacktestRunner::new(app_config(tmp.path()))
        .run(&run_config)
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("end_date"));
}

#[tokio::test]
async fn test_empty_data_dir_downloads_universe() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("tickers.yaml"), "tickers:\n  - AAPL\n  - BROKEN\n").unwrap();
    let run_config = write_run_config(
        tmp.path(),
        "strategy: {name: ema_cross}\nticker: AAPL\nstart_date: 2024-02-05\nend_date: 2024-02-09\n",
    );

    let provider = Arc::new(MockProvider::new());
    let outcome = BacktestRunner::new(app_config(tmp.path()))
        .with_provider(provider.clone())
        .run(&run_config)
        .await
        .unwrap()
        .unwrap();

    assert!(tmp.path().join("data").join("stock").join("AAPL.csv").is_file());
    assert!(!tmp.path().join("data").join("stock").join("BROKEN.csv").exists());

    // end date is passed one day later so the last day is included
    let requests = provider.requests.lock().unwrap().clone();
    assert!(requests.contains(&("AAPL".to_string(), d(2024, 2, 5), d(2024, 2, 10))));

    // flat prices never cross, so nothing trades
    assert_eq!(outcome.result.snapshots.len(), 5);
    assert!(outcome.result.orders.is_empty());
    assert_eq!(outcome.result.final_equity(), 100_000.0);
}

#[tokio::test]
async fn test_momentum_rebalance_trades_whole_universe() {
    let tmp = TempDir::new().unwrap();
    write_stock(
        tmp.path(),
        "AAA",
        "Date,Open,High,Low,Close,Volume\n2023-12-29,8,8,8,8,1\n2024-01-02,10,10,10,10,1\n2024-01-03,11,11,11,11,1\n2024-01-04,12,12,12,12,1\n",
    );
    write_stock(
        tmp.path(),
        "BBB",
        "Date,Open,High,Low,Close,Volume\n2023-12-29,12,12,12,12,1\n2024-01-02,10,10,10,10,1\n2024-01-03,10,10,10,10,1\n2024-01-04,9,9,9,9,1\n",
    );
    let run_config = write_run_config(
        tmp.path(),
        "\
strategy: {name: momentum_rebalance}
ticker: AAA
start_date: 2024-01-01
end_date: 2024-01-31
params:
  invest_amount: 1000
  top_n: 1
  lookback_days: 2
",
    );

    let outcome = BacktestRunner::new(app_config(tmp.path()))
        .run(&run_config)
        .await
        .unwrap()
        .unwrap();

    // history before the start date feeds the ranking: AAA +25%, BBB -16.7%
    let fills = &outcome.result.fills;
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].instrument, "AAA");
    assert_eq!(fills[0].quantity, 100);
    assert_eq!(fills[0].price, 10.0);
    // both stocks were fed to the engine, the run ticker only once
    assert_eq!(outcome.result.snapshots.len(), 3);
    assert_eq!(outcome.result.final_equity(), 100_200.0);
    assert!(outcome.result_dir.ends_with("momentum_rebalance_AAA"));
}

#[tokio::test]
async fn test_invalid_app_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("tickers.yaml"), "tickers:\n  - AAPL\n").unwrap();
    let run_config = write_run_config(tmp.path(), INDEX_HOLD_RUN);

    let mut config = app_config(tmp.path());
    config.data_source.timeout_secs = 0;

    let provider = Arc::new(MockProvider::new());
    let err = BacktestRunner::new(config)
        .with_provider(provider.clone())
        .run(&run_config)
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("data_source.timeout_secs"));
    // rejected before the empty data directory triggers a download
    assert!(provider.requests.lock().unwrap().is_empty());
    assert!(!tmp.path().join("data").exists());
    assert!(!tmp.path().join("result").exists());
}
