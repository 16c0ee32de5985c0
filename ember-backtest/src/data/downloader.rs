//! Batch downloader for the stock universe and benchmark indices.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use ember_common::util::preview_list;
use ember_common::DataSourceConfig;

use super::provider::{DataProvider, ProviderError};
use super::{Candle, PriceHistory};

/// How many failed tickers are named in the summary log line.
const FAILED_PREVIEW: usize = 20;

/// Wait used for a 429 that carries no `Retry-After`.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

/// Retry settings for recoverable provider errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base wait between attempts; grows linearly with the attempt number
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (1-based) after `error`.
    fn wait(&self, error: &ProviderError, attempt: u32) -> Duration {
        match error {
            ProviderError::RateLimited {
                retry_after_secs: Some(secs),
            } => Duration::from_secs(*secs),
            ProviderError::RateLimited { .. } => DEFAULT_RATE_LIMIT_WAIT.max(self.backoff),
            _ => self.backoff * attempt,
        }
    }
}

/// Result of a stock download.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Successfully downloaded histories by ticker
    pub data: BTreeMap<String, PriceHistory>,
    /// Tickers that failed or returned no rows, in request order
    pub failed: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TickerFile {
    tickers: Vec<String>,
}

/// Read the `tickers:` list from a YAML file.
pub fn load_tickers(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ticker file {}", path.display()))?;
    let file: TickerFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse ticker file {}", path.display()))?;
    Ok(file.tickers)
}

/// Downloads daily bars through a [`DataProvider`].
pub struct Downloader {
    provider: Arc<dyn DataProvider>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl Downloader {
    pub fn new(provider: Arc<dyn DataProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            retry: RetryPolicy::default(),
        }
    }

    /// Batch size and retry policy from the `data_source` section.
    pub fn from_config(provider: Arc<dyn DataProvider>, config: &DataSourceConfig) -> Self {
        Self::new(provider, config.batch_size).with_retry(RetryPolicy {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch one ticker, retrying recoverable errors.
    async fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.provider.get_daily_candles(ticker, start, end).await {
                Err(e) if e.is_recoverable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let wait = self.retry.wait(&e, attempt);
                    debug!(
                        ticker,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying download"
                    );
                    tokio::time::sleep(wait).await;
                }
                result => return result,
            }
        }
    }

    /// Download `tickers` in batches; requests within a batch run concurrently.
    pub async fn download_stocks(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> DownloadReport {
        let mut report = DownloadReport::default();

        for (i, batch) in tickers.chunks(self.batch_size).enumerate() {
            let (first, last) = match (batch.first(), batch.last()) {
                (Some(first), Some(last)) => (first, last),
                _ => continue,
            };
            info!(
                batch = i + 1,
                size = batch.len(),
                provider = self.provider.name(),
                "Downloading batch ({} tickers: {}..{})",
                batch.len(),
                first,
                last
            );

            let requests = batch
                .iter()
                .map(|ticker| self.fetch(ticker, start, end));
            let results = join_all(requests).await;

            for (ticker, result) in batch.iter().zip(results) {
                match result {
                    Ok(candles) if !candles.is_empty() => {
                        report
                            .data
                            .insert(ticker.clone(), PriceHistory::new(ticker.as_str(), candles));
                    }
                    Ok(_) => report.failed.push(ticker.clone()),
                    Err(e) => {
                        warn!(ticker = %ticker, error = %e, "Download failed");
                        report.failed.push(ticker.clone());
                    }
                }
            }
        }

        if !report.failed.is_empty() {
            warn!(
                count = report.failed.len(),
                "Failed to download {} tickers: {}",
                report.failed.len(),
                preview_list(&report.failed, FAILED_PREVIEW)
            );
        }
        info!(count = report.data.len(), "Successfully downloaded tickers");
        report
    }

    /// Download benchmark tickers one at a time. Failures are logged and skipped.
    pub async fn download_indices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> BTreeMap<String, PriceHistory> {
        info!(tickers = %preview_list(tickers, tickers.len()), "Downloading index data");
        let mut data = BTreeMap::new();

        for ticker in tickers {
            match self.fetch(ticker, start, end).await {
                Ok(candles) if !candles.is_empty() => {
                    info!(ticker = %ticker, rows = candles.len(), "Downloaded index");
                    data.insert(ticker.clone(), PriceHistory::new(ticker.as_str(), candles));
                }
                Ok(_) => warn!(ticker = %ticker, "No data"),
                Err(e) => warn!(ticker = %ticker, error = %e, "Index download failed"),
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves two bars for every ticker except those starting with `X`.
    struct FakeProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn get_daily_candles(
            &self,
            symbol: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Candle>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match symbol {
                s if s.starts_with('X') => Err(ProviderError::DataNotAvailable(s.to_string())),
                "EMPTY" => Ok(Vec::new()),
                s => Ok(vec![
                    Candle::daily(s, start, 1.0, 1.0, 1.0, 1.0, 10.0),
                    Candle::daily(s, start.succ_opt().unwrap(), 2.0, 2.0, 2.0, 2.0, 10.0),
                ]),
            }
        }
    }

    fn downloader(batch: usize) -> (Arc<FakeProvider>, Downloader) {
        let provider = Arc::new(FakeProvider {
            calls: AtomicUsize::new(0),
        });
        (provider.clone(), Downloader::new(provider, batch))
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_download_stocks_collects_failures() {
        let (provider, downloader) = downloader(2);
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let report = downloader
            .download_stocks(&tickers(&["AAPL", "XBAD", "MSFT", "EMPTY", "NVDA"]), start, end)
            .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        assert_eq!(report.data.keys().collect::<Vec<_>>(), vec!["AAPL", "MSFT", "NVDA"]);
        assert_eq!(report.failed, tickers(&["XBAD", "EMPTY"]));
        assert_eq!(report.data["AAPL"].len(), 2);
    }

    #[tokio::test]
    async fn test_download_indices_skips_failures() {
        let (_, downloader) = downloader(50);
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let data = downloader
            .download_indices(&tickers(&["^GSPC", "XIDX", "SPY"]), start, end)
            .await;
        assert_eq!(data.len(), 2);
        assert!(data.contains_key("^GSPC"));
    }

    /// Fails the first `failures` calls per ticker with `error`, then serves one bar.
    struct FlakyProvider {
        failures: usize,
        error: ProviderError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn get_daily_candles(
            &self,
            symbol: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Candle>, ProviderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(self.error.clone());
            }
            Ok(vec![Candle::daily(symbol, start, 1.0, 1.0, 1.0, 1.0, 10.0)])
        }
    }

    fn flaky(failures: usize, error: ProviderError, max_retries: u32) -> (Arc<FlakyProvider>, Downloader) {
        let provider = Arc::new(FlakyProvider {
            failures,
            error,
            calls: AtomicUsize::new(0),
        });
        let downloader = Downloader::new(provider.clone(), 10).with_retry(RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(1),
        });
        (provider, downloader)
    }

    #[tokio::test]
    async fn test_rate_limited_ticker_is_retried() {
        let (provider, downloader) = flaky(1, ProviderError::RateLimited { retry_after_secs: Some(0) }, 2);
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let report = downloader.download_stocks(&tickers(&["AAPL"]), start, end).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.data["AAPL"].len(), 1);
    }

    #[tokio::test]
    async fn test_network_errors_give_up_after_max_retries() {
        let (provider, downloader) = flaky(10, ProviderError::Network("reset".into()), 2);
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let data = downloader.download_indices(&tickers(&["SPY"]), start, end).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_unrecoverable_error_is_not_retried() {
        let (provider, downloader) = flaky(1, ProviderError::DataNotAvailable("AAPL".into()), 2);
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let report = downloader.download_stocks(&tickers(&["AAPL"]), start, end).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.failed, tickers(&["AAPL"]));
    }

    #[test]
    fn test_retry_wait() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(100),
        };
        let limited = ProviderError::RateLimited { retry_after_secs: Some(7) };
        assert_eq!(policy.wait(&limited, 1), Duration::from_secs(7));
        let limited = ProviderError::RateLimited { retry_after_secs: None };
        assert_eq!(policy.wait(&limited, 1), DEFAULT_RATE_LIMIT_WAIT);
        let network = ProviderError::Network("timeout".into());
        assert_eq!(policy.wait(&network, 3), Duration::from_millis(300));
    }

    #[test]
    fn test_load_tickers() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "tickers:\n  - AAPL\n  - MSFT\n").unwrap();
        assert_eq!(load_tickers(tmp.path()).unwrap(), tickers(&["AAPL", "MSFT"]));

        std::fs::write(tmp.path(), "symbols: []\n").unwrap();
        assert!(load_tickers(tmp.path()).is_err());
    }
}
