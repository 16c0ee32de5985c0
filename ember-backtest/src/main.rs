//! Ember Backtest - config-driven daily-bar backtester.
//!
//! `run` backtests the strategy described by a run config, `download` fills the
//! local CSV store, `select` prints the momentum ranking from local data, and
//! `strategies` lists the built-in strategies.

use anyhow::{ensure, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ember_backtest::data::{load_tickers, Downloader, LocalStorage, YahooProvider};
use ember_backtest::strategy::{calculate_shares, equal_weight, momentum_scores, StrategyRegistry};
use ember_backtest::BacktestRunner;
use ember_common::config::Config;
use ember_common::logging::init_logging_with_exclusions;
use ember_common::Validate;

/// Default download window.
const DEFAULT_START: (i32, u32, u32) = (2022, 1, 1);
const DEFAULT_END: (i32, u32, u32) = (2025, 1, 1);

#[derive(Parser, Debug)]
#[command(name = "ember-backtest")]
#[command(version)]
#[command(about = "Config-driven daily-bar backtester", long_about = None)]
struct Cli {
    /// Application config file (default: ./ember.yaml, then ~/.ember/config.yaml)
    #[arg(long, global = true)]
    app_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the backtest described by a run config
    Run {
        /// Run config file (default: paths.run_config)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Download daily bars into the local data directory
    Download {
        /// Ticker universe file (default: paths.ticker_file)
        #[arg(long)]
        tickers: Option<PathBuf>,

        /// First date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date, exclusive (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Download the stock universe
        #[arg(long)]
        stocks: bool,

        /// Download index tickers (default when --stocks is not given)
        #[arg(long)]
        indices: bool,
    },

    /// Print the momentum ranking from local data
    Select {
        /// Ranking date (YYYY-MM-DD), inclusive
        #[arg(long)]
        as_of: NaiveDate,

        /// Lookback window in trading days
        #[arg(long, default_value = "200")]
        lookback_days: usize,

        /// Number of tickers to print
        #[arg(long, default_value = "50")]
        top_n: usize,

        /// Also print equal-weight share counts for this amount
        #[arg(long)]
        invest_amount: Option<f64>,
    },

    /// List the built-in strategies
    Strategies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.app_config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.validate().context("invalid application config")?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::debug!("Ember Backtest v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { config: run_config } => {
            let path = run_config.unwrap_or_else(|| config.paths.run_config());
            BacktestRunner::new(config).run(&path).await?;
        }
        Commands::Download {
            tickers,
            start,
            end,
            stocks,
            indices,
        } => {
            let start = start.unwrap_or_else(|| date(DEFAULT_START));
            let end = end.unwrap_or_else(|| date(DEFAULT_END));
            download(&config, tickers, start, end, stocks, indices || !stocks).await?;
        }
        Commands::Select {
            as_of,
            lookback_days,
            top_n,
            invest_amount,
        } => select(&config, as_of, lookback_days, top_n, invest_amount)?,
        Commands::Strategies => print!("{}", StrategyRegistry::new().describe()),
    }

    Ok(())
}

async fn download(
    config: &Config,
    ticker_file: Option<PathBuf>,
    start: NaiveDate,
    end: NaiveDate,
    stocks: bool,
    indices: bool,
) -> Result<()> {
    let storage = LocalStorage::new(config.paths.data_dir());
    let provider = Arc::new(YahooProvider::from_config(&config.data_source));
    let downloader = Downloader::from_config(provider, &config.data_source);

    if stocks {
        let path = ticker_file.unwrap_or_else(|| config.paths.ticker_file());
        let tickers = load_tickers(&path)?;
        let report = downloader.download_stocks(&tickers, start, end).await;
        let saved = storage.save_stocks(&report.data)?;
        println!("Saved {} stock files ({} failed)", saved, report.failed.len());
        if !report.failed.is_empty() {
            println!("Failed: {}", report.failed.join(", "));
        }
    }

    if indices {
        let data = downloader
            .download_indices(&config.data_source.index_tickers, start, end)
            .await;
        let saved = storage.save_indices(&data)?;
        println!("Saved {} index files", saved);
    }

    Ok(())
}

fn select(
    config: &Config,
    as_of: NaiveDate,
    lookback_days: usize,
    top_n: usize,
    invest_amount: Option<f64>,
) -> Result<()> {
    ensure!(lookback_days > 0, "--lookback-days must be positive");
    if let Some(amount) = invest_amount {
        ensure!(amount > 0.0, "--invest-amount must be positive, got {}", amount);
    }

    let storage = LocalStorage::new(config.paths.data_dir());
    let data = storage
        .load()
        .with_context(|| format!("loading data from {}", storage.root().display()))?;

    let scores = momentum_scores(&data, as_of, lookback_days);
    let top: Vec<String> = scores.iter().take(top_n).map(|(ticker, _)| ticker.clone()).collect();
    let shares = invest_amount
        .map(|amount| calculate_shares(&equal_weight(&top, amount), &data, as_of))
        .unwrap_or_default();

    println!(
        "Top {} of {} stocks by {}-day momentum as of {}",
        top.len(),
        scores.len(),
        lookback_days,
        as_of
    );
    for (rank, (ticker, score)) in scores.iter().take(top_n).enumerate() {
        match shares.get(ticker) {
            Some(count) => println!(
                "{:>4}  {:<8} {:>9.2}%  {:>12.4} shares",
                rank + 1,
                ticker,
                score * 100.0,
                count
            ),
            None => println!("{:>4}  {:<8} {:>9.2}%", rank + 1, ticker, score * 100.0),
        }
    }
    Ok(())
}

fn date((y, m, d): (i32, u32, u32)) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}
