//! Yahoo Finance chart API adapter.
//!
//! Fetches daily OHLCV bars from the v8 chart endpoint:
//! `/v8/finance/chart/{symbol}?period1=..&period2=..&interval=1d`
//!
//! The end date is exclusive. Rows where any OHLCV value is null are dropped.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use ember_common::DataSourceConfig;

use super::provider::{DataProvider, ProviderError};
use super::rate_limiter::{RateLimiter, SharedRateLimiter};
use super::{Candle, Timeframe};

// ============================================================================
// Constants
// ============================================================================

const CHART_ENDPOINT: &str = "/v8/finance/chart";

/// Retry hint after a 429
const RATE_LIMIT_RETRY_SECS: u64 = 5;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

fn at(column: &[Option<f64>], i: usize) -> Option<f64> {
    column.get(i).copied().flatten()
}

// ============================================================================
// Yahoo Provider
// ============================================================================

/// Daily bar source backed by the Yahoo Finance chart API.
pub struct YahooProvider {
    base_url: String,
    user_agent: String,
    client: reqwest::Client,
    rate_limiter: SharedRateLimiter,
}

impl YahooProvider {
    /// Create a provider for `base_url` with the given request budget.
    pub fn new(base_url: impl Into<String>, rate_limit_rpm: u32) -> Self {
        Self::with_timeout(base_url, rate_limit_rpm, Duration::from_secs(30))
    }

    fn with_timeout(base_url: impl Into<String>, rate_limit_rpm: u32, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            client,
            rate_limiter: Arc::new(RateLimiter::new("yahoo", rate_limit_rpm)),
        }
    }

    /// Create from the data source section of the application config.
    pub fn from_config(config: &DataSourceConfig) -> Self {
        let mut provider = Self::with_timeout(
            config.base_url.clone(),
            config.rate_limit_rpm,
            Duration::from_secs(config.timeout_secs),
        );
        provider.user_agent = config.user_agent.clone();
        provider
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}{}/{}", self.base_url, CHART_ENDPOINT, symbol)
    }

    /// Convert the columnar chart payload into candles, skipping incomplete rows.
    fn parse_chart(symbol: &str, data: ChartData) -> Result<Vec<Candle>, ProviderError> {
        let timestamps = data.timestamp.unwrap_or_default();
        let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

        let mut candles = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.iter().enumerate() {
            let row = (
                at(&quote.open, i),
                at(&quote.high, i),
                at(&quote.low, i),
                at(&quote.close, i),
                at(&quote.volume, i),
            );
            let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = row else {
                continue;
            };

            let local = DateTime::from_timestamp(ts + data.meta.gmtoffset, 0)
                .ok_or_else(|| ProviderError::Internal(format!("Invalid timestamp: {}", ts)))?;

            candles.push(Candle::daily(
                symbol,
                local.date_naive(),
                open,
                high,
                low,
                close,
                volume,
            ));
        }

        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

// ============================================================================
// DataProvider Implementation
// ============================================================================

#[async_trait]
impl DataProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn get_daily_candles(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        if end_date <= start_date {
            return Err(ProviderError::InvalidRequest(format!(
                "end date {} is not after start date {}",
                end_date, start_date
            )));
        }

        let period1 = start_date.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end_date.and_time(NaiveTime::MIN).and_utc().timestamp();
        let url = self.chart_url(symbol);

        self.rate_limiter.acquire().await;
        debug!(url = %url, symbol, %start_date, %end_date, "Fetching daily bars");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", Timeframe::Daily.to_api_interval().to_string()),
                ("events", "history".to_string()),
            ])
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network("Request timeout".into())
                } else if e.is_connect() {
                    ProviderError::Network("Connection failed".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::DataNotAvailable(format!(
                "{}: symbol not found",
                symbol
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))?;

        if let Some(err) = body.chart.error {
            return Err(ProviderError::DataNotAvailable(format!(
                "{}: {} - {}",
                symbol, err.code, err.description
            )));
        }

        let data = body
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("{}: empty result", symbol)))?;

        let candles = Self::parse_chart(symbol, data)?;
        debug!(symbol, rows = candles.len(), "Parsed daily bars");
        Ok(candles)
    }
}

// ============================================================================
// Tests
// ============================================================================
