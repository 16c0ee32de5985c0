//! Flat-file price store.
//!
//! One CSV per ticker with the columns `Date,Open,High,Low,Close,Volume`:
//! stocks under `{root}/stock/`, benchmarks under `{root}/index/`. Index
//! file names have `^` stripped (`^GSPC` is stored as `GSPC.csv`).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use ember_common::util::{safe_file_name, DATE_FORMAT};

use super::{Candle, MarketData, PriceHistory};

const STOCK_DIR: &str = "stock";
const INDEX_DIR: &str = "index";

/// One CSV row
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: Option<f64>,
    #[serde(rename = "High")]
    high: Option<f64>,
    #[serde(rename = "Low")]
    low: Option<f64>,
    #[serde(rename = "Close")]
    close: Option<f64>,
    #[serde(rename = "Volume")]
    volume: Option<f64>,
}

impl CsvRow {
    fn from_candle(candle: &Candle) -> Self {
        Self {
            date: candle.date().format(DATE_FORMAT).to_string(),
            open: Some(candle.open),
            high: Some(candle.high),
            low: Some(candle.low),
            close: Some(candle.close),
            volume: Some(candle.volume),
        }
    }

    /// `None` when the date is unparseable or any value is missing.
    fn into_candle(self, symbol: &str) -> Option<Candle> {
        // Accept full timestamps ("2024-01-02 00:00:00-05:00") by taking the date part.
        let date_part = self.date.get(..10)?;
        let date = NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()?;
        Some(Candle::daily(
            symbol,
            date,
            self.open?,
            self.high?,
            self.low?,
            self.close?,
            self.volume?,
        ))
    }
}

/// CSV price store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stock_dir(&self) -> PathBuf {
        self.root.join(STOCK_DIR)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    /// True when the root is missing or has no entries.
    pub fn is_empty(&self) -> bool {
        match fs::read_dir(&self.root) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    // ========================================================================
    // Save
    // ========================================================================

    pub fn save_stocks(&self, data: &BTreeMap<String, PriceHistory>) -> Result<usize> {
        let saved = Self::save_dir(&self.stock_dir(), data)?;
        info!(count = saved, dir = %self.stock_dir().display(), "Saved stock data");
        Ok(saved)
    }

    pub fn save_indices(&self, data: &BTreeMap<String, PriceHistory>) -> Result<usize> {
        let saved = Self::save_dir(&self.index_dir(), data)?;
        info!(count = saved, dir = %self.index_dir().display(), "Saved index data");
        Ok(saved)
    }

    fn save_dir(dir: &Path, data: &BTreeMap<String, PriceHistory>) -> Result<usize> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        for (ticker, history) in data {
            let path = dir.join(format!("{}.csv", safe_file_name(ticker)));
            Self::write_csv(&path, history)?;
        }
        Ok(data.len())
    }

    /// Write one history as CSV.
    pub fn write_csv(path: &Path, history: &PriceHistory) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for candle in history.candles() {
            writer.serialize(CsvRow::from_candle(candle))?;
        }
        writer.flush()?;
        debug!(path = %path.display(), rows = history.len(), "Wrote price file");
        Ok(())
    }

    // ========================================================================
    // Load
    // ========================================================================

    pub fn load_stocks(&self) -> Result<BTreeMap<String, PriceHistory>> {
        let data = Self::load_dir(&self.stock_dir())?;
        info!(count = data.len(), "Loaded stock data");
        Ok(data)
    }

    pub fn load_indices(&self) -> Result<BTreeMap<String, PriceHistory>> {
        let data = Self::load_dir(&self.index_dir())?;
        info!(count = data.len(), "Loaded index data");
        Ok(data)
    }

    /// Load stocks and indices together.
    pub fn load(&self) -> Result<MarketData> {
        Ok(MarketData::new(self.load_stocks()?, self.load_indices()?))
    }

    fn load_dir(dir: &Path) -> Result<BTreeMap<String, PriceHistory>> {
        let mut data = BTreeMap::new();
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Data directory does not exist");
            return Ok(data);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        files.sort();

        for path in files {
            let Some(ticker) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::read_csv(&path, ticker) {
                Ok(history) => {
                    data.insert(ticker.to_string(), history);
                }
                Err(e) => warn!(
                    file = %path.display(),
                    error = %format!("{:#}", e),
                    "Skipping unreadable price file"
                ),
            }
        }
        Ok(data)
    }

    /// Read one CSV file into a history, dropping incomplete rows.
    pub fn read_csv(path: &Path, ticker: &str) -> Result<PriceHistory> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut candles = Vec::new();
        let mut dropped = 0usize;
        for row in reader.deserialize::<CsvRow>() {
            let row = row.with_context(|| format!("Malformed row in {}", path.display()))?;
            match row.into_candle(ticker) {
                Some(candle) => candles.push(candle),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!(ticker, dropped, "Dropped incomplete rows");
        }
        Ok(PriceHistory::new(ticker, candles))
    }
}
