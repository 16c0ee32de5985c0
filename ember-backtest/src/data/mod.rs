//! Market data module.
//!
//! Provides daily OHLCV bars, per-ticker price histories, downloading from a
//! remote provider, and the flat CSV store the backtester reads from.
//!
//! # Layout on disk
//! - `data/stock/{TICKER}.csv` - stock universe
//! - `data/index/{TICKER}.csv` - benchmarks (`^` stripped from the file name)

mod downloader;
mod local_storage;
mod provider;
mod rate_limiter;
mod yahoo;

pub use downloader::{load_tickers, DownloadReport, Downloader, RetryPolicy};
pub use local_storage::LocalStorage;
pub use provider::{DataProvider, ProviderError};
pub use rate_limiter::{RateLimiter, SharedRateLimiter};
pub use yahoo::YahooProvider;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Core Data Types
// ============================================================================

/// Bar aggregation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// Daily bars
    Daily,
    /// Weekly bars
    Weekly,
}

impl Timeframe {
    /// Interval parameter understood by the chart API
    pub fn to_api_interval(&self) -> &'static str {
        match self {
            Self::Daily => "1d",
            Self::Weekly => "1wk",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "1-DAY"),
            Self::Weekly => write!(f, "1-WEEK"),
        }
    }
}

/// A single OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Ticker
    pub symbol: String,
    /// Timeframe
    pub timeframe: Timeframe,
    /// Bar open time (00:00 UTC of the trading day for daily bars)
    pub timestamp: DateTime<Utc>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume
    pub volume: f64,
}

impl Candle {
    /// Create a daily bar for `date`
    pub fn daily(
        symbol: impl Into<String>,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: Timeframe::Daily,
            timestamp: date.and_time(chrono::NaiveTime::MIN).and_utc(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Trading date of the bar
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// All price fields are finite and positive
    pub fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
            && self.volume.is_finite()
    }

    /// Bar type string in the `SYMBOL.VENUE-1-DAY-LAST-EXTERNAL` form
    pub fn bar_type(&self, venue: &str) -> String {
        format!("{}.{}-{}-LAST-EXTERNAL", self.symbol, venue, self.timeframe)
    }
}

// ============================================================================
// Price History
// ============================================================================

/// Daily bars of one ticker, ascending by date with unique dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    symbol: String,
    candles: Vec<Candle>,
}

impl PriceHistory {
    /// Build a history, sorting by date. When a date repeats the later bar wins.
    pub fn new(symbol: impl Into<String>, mut candles: Vec<Candle>) -> Self {
        candles.retain(Candle::is_valid);
        candles.sort_by_key(|c| c.timestamp);

        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match deduped.last_mut() {
                Some(last) if last.date() == candle.date() => *last = candle,
                _ => deduped.push(candle),
            }
        }

        Self {
            symbol: symbol.into(),
            candles: deduped,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.candles.first().map(Candle::date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.candles.last().map(Candle::date)
    }

    /// Bars dated on or before `date`.
    pub fn until(&self, date: NaiveDate) -> &[Candle] {
        let end = self.candles.partition_point(|c| c.date() <= date);
        &self.candles[..end]
    }

    /// Bars dated within `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> &[Candle] {
        let lo = self.candles.partition_point(|c| c.date() < start);
        let hi = self.candles.partition_point(|c| c.date() <= end);
        if lo >= hi {
            &[]
        } else {
            &self.candles[lo..hi]
        }
    }

    /// Last close at or before `date`.
    pub fn close_on_or_before(&self, date: NaiveDate) -> Option<f64> {
        self.until(date).last().map(|c| c.close)
    }

    /// Close prices in date order.
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

// ============================================================================
// Market Data
// ============================================================================

/// All loaded price histories, split into the stock universe and indices.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub stocks: BTreeMap<String, PriceHistory>,
    pub indices: BTreeMap<String, PriceHistory>,
}

impl MarketData {
    pub fn new(
        stocks: BTreeMap<String, PriceHistory>,
        indices: BTreeMap<String, PriceHistory>,
    ) -> Self {
        Self { stocks, indices }
    }

    /// Look up a ticker, stocks first.
    pub fn get(&self, ticker: &str) -> Option<&PriceHistory> {
        self.stocks.get(ticker).or_else(|| self.indices.get(ticker))
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.get(ticker).is_some()
    }

    pub fn is_stock(&self, ticker: &str) -> bool {
        self.stocks.contains_key(ticker)
    }

    /// Stock tickers in sorted order.
    pub fn stock_tickers(&self) -> Vec<String> {
        self.stocks.keys().cloned().collect()
    }

    /// Every ticker (stocks, then indices).
    pub fn tickers(&self) -> Vec<String> {
        self.stocks
            .keys()
            .chain(self.indices.keys())
            .cloned()
            .collect()
    }

    pub fn insert_stock(&mut self, history: PriceHistory) {
        self.stocks.insert(history.symbol().to_string(), history);
    }

    pub fn insert_index(&mut self, history: PriceHistory) {
        self.indices.insert(history.symbol().to_string(), history);
    }

    /// Last close of `ticker` at or before `date`.
    pub fn close_on_or_before(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        self.get(ticker)?.close_on_or_before(date)
    }
}

// ============================================================================
// Tests
// ============================================================================
