//! Backtest performance metrics.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::execution::Position;

/// Trading days per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Calendar days per year used for CAGR.
const DAYS_PER_YEAR: f64 = 365.25;

// ============================================================================
// Series helpers
// ============================================================================

/// Simple period-over-period returns; the first point has no return.
pub fn returns(curve: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    curve
        .windows(2)
        .filter(|w| w[0].1 != 0.0)
        .map(|w| (w[1].0, w[1].1 / w[0].1 - 1.0))
        .filter(|(_, r)| r.is_finite())
        .collect()
}

/// Drawdown from the running peak at every point (0 or negative).
pub fn drawdowns(curve: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    let mut peak = f64::MIN;
    curve
        .iter()
        .map(|(date, value)| {
            peak = peak.max(*value);
            let dd = if peak > 0.0 { value / peak - 1.0 } else { 0.0 };
            (*date, dd)
        })
        .collect()
}

/// Compounded returns per calendar month, keyed by (year, month).
pub fn monthly_returns(returns: &[(NaiveDate, f64)]) -> BTreeMap<(i32, u32), f64> {
    let mut months: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for (date, r) in returns {
        let growth = months.entry((date.year(), date.month())).or_insert(1.0);
        *growth *= 1.0 + r;
    }
    months.values_mut().for_each(|g| *g -= 1.0);
    months
}

// ============================================================================
// Performance statistics
// ============================================================================

/// Return and risk statistics of an equity curve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Number of return observations
    pub periods: usize,
    pub total_return: f64,
    pub cagr: f64,
    /// Annualized standard deviation of daily returns
    pub volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Deepest peak-to-trough decline, as a negative fraction
    pub max_drawdown: f64,
    pub calmar: f64,
    pub best_day: f64,
    pub worst_day: f64,
    /// Fraction of days with a positive return
    pub win_days: f64,
}

impl PerformanceStats {
    /// Statistics of an equity curve of `(date, value)` points in date order.
    pub fn from_equity(curve: &[(NaiveDate, f64)]) -> Self {
        let rets: Vec<f64> = returns(curve).into_iter().map(|(_, r)| r).collect();
        let mut stats = Self::from_returns(&rets);

        stats.start_date = curve.first().map(|(d, _)| *d);
        stats.end_date = curve.last().map(|(d, _)| *d);

        if let (Some((start, first)), Some((end, last))) = (curve.first(), curve.last()) {
            if *first > 0.0 {
                stats.total_return = last / first - 1.0;
                let years = (*end - *start).num_days() as f64 / DAYS_PER_YEAR;
                stats.cagr = if years > 0.0 && *last > 0.0 {
                    (last / first).powf(1.0 / years) - 1.0
                } else {
                    0.0
                };
            }
        }
        stats.max_drawdown = drawdowns(curve)
            .into_iter()
            .map(|(_, dd)| dd)
            .fold(0.0, f64::min);
        stats.calmar = if stats.max_drawdown < 0.0 {
            stats.cagr / stats.max_drawdown.abs()
        } else {
            0.0
        };
        stats
    }

    /// Statistics that depend only on the return series. Total return is
    /// compounded; CAGR and drawdown need dates and are left at zero.
    pub fn from_returns(rets: &[f64]) -> Self {
        if rets.is_empty() {
            return Self::default();
        }
        let n = rets.len() as f64;
        let mean = rets.iter().mean();
        let std_dev = if rets.len() > 1 { rets.iter().std_dev() } else { 0.0 };

        let sharpe = if std_dev > 0.0 {
            mean / std_dev * TRADING_DAYS.sqrt()
        } else {
            0.0
        };

        let downside = (rets.iter().filter(|r| **r < 0.0).map(|r| r * r).sum::<f64>() / n).sqrt();
        let sortino = if downside > 0.0 {
            mean / downside * TRADING_DAYS.sqrt()
        } else {
            0.0
        };

        let total_return = rets.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;

        Self {
            start_date: None,
            end_date: None,
            periods: rets.len(),
            total_return,
            cagr: 0.0,
            volatility: std_dev * TRADING_DAYS.sqrt(),
            sharpe,
            sortino,
            max_drawdown: 0.0,
            calmar: 0.0,
            best_day: rets.iter().copied().fold(f64::MIN, f64::max),
            worst_day: rets.iter().copied().fold(f64::MAX, f64::min),
            win_days: rets.iter().filter(|r| **r > 0.0).count() as f64 / n,
        }
    }
}

// ============================================================================
// Trade statistics
// ============================================================================

/// Statistics over closed positions (one round trip each).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction of winning trades
    pub win_rate: f64,
    pub gross_profit: f64,
    /// Positive sum of losing PnL
    pub gross_loss: f64,
    pub net_profit: f64,
    /// Gross profit over gross loss; `f64::MAX` when nothing lost
    pub profit_factor: f64,
    pub avg_winner: f64,
    pub avg_loser: f64,
    pub avg_holding_days: f64,
    /// Average PnL per trade from win rate and average winner/loser
    pub expectancy: f64,
    pub total_commission: f64,
}

impl TradeStats {
    pub fn from_positions<'a>(closed: impl IntoIterator<Item = &'a Position>) -> Self {
        let trades: Vec<&Position> = closed.into_iter().filter(|p| p.is_closed()).collect();
        let total_trades = trades.len();
        if total_trades == 0 {
            return Self::default();
        }

        let (winners, losers): (Vec<&Position>, Vec<&Position>) =
            trades.iter().copied().partition(|p| p.realized_pnl > 0.0);

        let gross_profit: f64 = winners.iter().map(|p| p.realized_pnl).sum();
        let gross_loss: f64 = losers.iter().map(|p| p.realized_pnl.abs()).sum();
        let net_profit: f64 = trades.iter().map(|p| p.realized_pnl).sum();
        let total_commission: f64 = trades.iter().map(|p| p.commissions).sum();

        let win_rate = winners.len() as f64 / total_trades as f64;
        let avg_winner = if winners.is_empty() {
            0.0
        } else {
            gross_profit / winners.len() as f64
        };
        let avg_loser = if losers.is_empty() {
            0.0
        } else {
            gross_loss / losers.len() as f64
        };

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            // JSON has no infinity
            f64::MAX
        } else {
            0.0
        };

        let avg_holding_days = trades
            .iter()
            .map(|p| p.holding_days(p.ts_opened) as f64)
            .sum::<f64>()
            / total_trades as f64;

        let expectancy = win_rate * avg_winner - (1.0 - win_rate) * avg_loser;

        Self {
            total_trades,
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate,
            gross_profit,
            gross_loss,
            net_profit,
            profit_factor,
            avg_winner,
            avg_loser,
            avg_holding_days,
            expectancy,
            total_commission,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
