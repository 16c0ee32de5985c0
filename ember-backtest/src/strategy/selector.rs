//! Momentum ranking and equal-weight sizing over the stock universe.

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::data::MarketData;

/// Momentum of every stock with at least `lookback_days` rows up to and
/// including `as_of`, sorted descending (ties by ticker).
///
/// `momentum = (close[-1] - close[-lookback]) / close[-lookback]`
///
/// A zero lookback scores nothing; callers validate it before ranking.
pub fn momentum_scores(data: &MarketData, as_of: NaiveDate, lookback: usize) -> Vec<(String, f64)> {
    if lookback == 0 {
        return Vec::new();
    }

    let mut scores: Vec<(String, f64)> = data
        .stocks
        .iter()
        .filter_map(|(ticker, history)| {
            let window = history.until(as_of);
            if window.len() < lookback {
                return None;
            }
            let current = window[window.len() - 1].close;
            let past = window[window.len() - lookback].close;
            let momentum = (current - past) / past;
            momentum.is_finite().then(|| (ticker.clone(), momentum))
        })
        .collect();

    scores.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scores
}

/// Top `top_n` tickers by momentum as of `as_of`.
pub fn momentum_select(
    data: &MarketData,
    as_of: NaiveDate,
    lookback_days: usize,
    top_n: usize,
) -> Vec<String> {
    momentum_scores(data, as_of, lookback_days)
        .into_iter()
        .take(top_n)
        .map(|(ticker, _)| ticker)
        .collect()
}

/// Split `total_amount` equally across `tickers`.
pub fn equal_weight(tickers: &[String], total_amount: f64) -> BTreeMap<String, f64> {
    if tickers.is_empty() {
        return BTreeMap::new();
    }
    let per_stock = total_amount / tickers.len() as f64;
    tickers.iter().map(|t| (t.clone(), per_stock)).collect()
}

/// Convert dollar allocations into (fractional) share counts at the close on
/// or before `as_of`. Tickers without a price are skipped.
pub fn calculate_shares(
    allocations: &BTreeMap<String, f64>,
    data: &MarketData,
    as_of: NaiveDate,
) -> BTreeMap<String, f64> {
    allocations
        .iter()
        .filter_map(|(ticker, amount)| {
            let price = data.stocks.get(ticker)?.close_on_or_before(as_of)?;
            (price > 0.0).then(|| (ticker.clone(), amount / price))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::{date, history};

    fn universe() -> MarketData {
        let mut data = MarketData::default();
        // +100% over 3 rows
        data.insert_stock(history("AAA", date(0), &[10.0, 15.0, 20.0, 5.0]));
        // +50%
        data.insert_stock(history("BBB", date(0), &[10.0, 12.0, 15.0, 30.0]));
        // +50%, ties with BBB
        data.insert_stock(history("CCC", date(0), &[20.0, 25.0, 30.0, 30.0]));
        // too short
        data.insert_stock(history("DDD", date(1), &[1.0, 2.0]));
        data
    }

    #[test]
    fn test_momentum_select_orders_and_filters() {
        let data = universe();
        // as_of date(2) includes rows 0..=2
        let selected = momentum_select(&data, date(2), 3, 10);
        assert_eq!(selected, vec!["AAA", "BBB", "CCC"]);

        let scores = momentum_scores(&data, date(2), 3);
        assert!((scores[0].1 - 1.0).abs() < 1e-12);
        assert!((scores[1].1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_momentum_select_as_of_is_inclusive() {
        let data = universe();
        // Adding row 3 flips the ranking: BBB 30/12 - 1, CCC 30/25 - 1, AAA 5/15 - 1
        let selected = momentum_select(&data, date(3), 3, 2);
        assert_eq!(selected, vec!["BBB", "CCC"]);
    }

    #[test]
    fn test_momentum_select_requires_lookback_rows() {
        let data = universe();
        assert!(momentum_select(&data, date(1), 3, 10).is_empty());
        assert_eq!(momentum_select(&data, date(2), 2, 10).len(), 4);
    }

    #[test]
    fn test_zero_lookback_scores_nothing() {
        assert!(momentum_scores(&universe(), date(3), 0).is_empty());
    }

    #[test]
    fn test_equal_weight_and_shares() {
        let data = universe();
        let tickers = vec!["AAA".to_string(), "BBB".to_string()];
        let weights = equal_weight(&tickers, 1000.0);
        assert_eq!(weights["AAA"], 500.0);
        assert!(equal_weight(&[], 1000.0).is_empty());

        let shares = calculate_shares(&weights, &data, date(2));
        assert_eq!(shares["AAA"], 25.0);
        assert!((shares["BBB"] - 33.333333333333336).abs() < 1e-9);
    }
}
