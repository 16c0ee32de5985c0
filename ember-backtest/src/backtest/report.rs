//! Account, positions and order-fill reports: CSV rows and console tables.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

use crate::engine::BacktestResult;
use crate::execution::{MarketOrder, OrderStatus, Position, PositionSide};

use super::metrics::{PerformanceStats, TradeStats};

/// Rows shown per table on the console.
const TABLE_ROWS: usize = 20;

// ============================================================================
// Rows
// ============================================================================

/// One row of `account.csv`.
#[derive(Debug, Clone, Serialize)]
pub struct AccountRow {
    pub date: NaiveDate,
    pub total: f64,
    /// Market value of open positions
    pub position_value: f64,
    /// Free cash
    pub free: f64,
    pub currency: String,
}

/// One row of `positions.csv`.
#[derive(Debug, Clone, Serialize)]
pub struct PositionRow {
    pub position_id: String,
    pub instrument_id: String,
    pub strategy_id: String,
    pub opening_order_id: String,
    pub side: PositionSide,
    pub peak_qty: u64,
    pub quantity: u64,
    pub ts_opened: NaiveDate,
    pub ts_closed: Option<NaiveDate>,
    pub avg_px_open: f64,
    pub avg_px_close: Option<f64>,
    pub realized_return: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub commissions: f64,
}

/// One row of `order_fills.csv`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderFillRow {
    pub client_order_id: String,
    pub instrument_id: String,
    pub strategy_id: String,
    pub side: String,
    pub quantity: u64,
    pub filled_qty: u64,
    pub avg_px: f64,
    pub commission: f64,
    pub status: OrderStatus,
    pub ts_init: NaiveDate,
    pub ts_last: NaiveDate,
}

fn venue_id(instrument: &str, venue: &str) -> String {
    format!("{}.{}", instrument, venue)
}

pub fn account_rows(result: &BacktestResult) -> Vec<AccountRow> {
    result
        .snapshots
        .iter()
        .map(|s| AccountRow {
            date: s.date,
            total: s.total,
            position_value: s.position_value,
            free: s.cash,
            currency: s.currency.clone(),
        })
        .collect()
}

pub fn position_rows(result: &BacktestResult) -> Vec<PositionRow> {
    result
        .positions
        .iter()
        .map(|p: &Position| PositionRow {
            position_id: p.position_id.clone(),
            instrument_id: venue_id(&p.instrument, &result.venue),
            strategy_id: p.strategy_id.clone(),
            opening_order_id: p.opening_order_id.clone(),
            side: p.side,
            peak_qty: p.peak_qty,
            quantity: p.quantity,
            ts_opened: p.ts_opened,
            ts_closed: p.ts_closed,
            avg_px_open: p.avg_px_open,
            avg_px_close: (p.sold_qty > 0).then_some(p.avg_px_close),
            realized_return: p.realized_return(),
            realized_pnl: p.realized_pnl,
            unrealized_pnl: p.unrealized_pnl(),
            commissions: p.commissions,
        })
        .collect()
}

/// Filled orders only; denials are reported separately.
pub fn order_fill_rows(result: &BacktestResult) -> Vec<OrderFillRow> {
    result
        .orders
        .iter()
        .filter(|o| o.is_filled())
        .map(|o: &MarketOrder| OrderFillRow {
            client_order_id: o.client_order_id.clone(),
            instrument_id: venue_id(&o.instrument, &result.venue),
            strategy_id: o.strategy_id.clone(),
            side: o.side.to_string(),
            quantity: o.quantity,
            filled_qty: o.filled_qty,
            avg_px: o.avg_px.unwrap_or_default(),
            commission: o.commission,
            status: o.status,
            ts_init: o.ts_init,
            ts_last: o.ts_last,
        })
        .collect()
}

/// Write serializable rows as CSV with a header line.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

// ============================================================================
// Console tables
// ============================================================================

/// Account table (first and last rows when long).
pub fn format_account_table(result: &BacktestResult) -> String {
    let rows = account_rows(result);
    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:>16} {:>16} {:>16} {:>5}", "date", "total", "position_value", "free", "ccy");
    for row in elide(&rows) {
        match row {
            Some(r) => {
                let _ = writeln!(
                    out,
                    "{:<12} {:>16.2} {:>16.2} {:>16.2} {:>5}",
                    r.date, r.total, r.position_value, r.free, r.currency
                );
            }
            None => out.push_str("...\n"),
        }
    }
    out
}

pub fn format_positions_table(result: &BacktestResult) -> String {
    let rows = position_rows(result);
    if rows.is_empty() {
        return "(no positions)\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<14} {:<6} {:>8} {:<12} {:<12} {:>10} {:>10} {:>12} {:>9}",
        "instrument", "side", "peak", "opened", "closed", "px_open", "px_close", "realized", "return"
    );
    for row in elide(&rows) {
        match row {
            Some(r) => {
                let closed = r.ts_closed.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
                let px_close = r.avg_px_close.map(|p| format!("{:.2}", p)).unwrap_or_else(|| "-".to_string());
                let _ = writeln!(
                    out,
                    "{:<14} {:<6} {:>8} {:<12} {:<12} {:>10.2} {:>10} {:>12.2} {:>8.2}%",
                    r.instrument_id,
                    format!("{:?}", r.side).to_uppercase(),
                    r.peak_qty,
                    r.ts_opened,
                    closed,
                    r.avg_px_open,
                    px_close,
                    r.realized_pnl,
                    r.realized_return * 100.0
                );
            }
            None => out.push_str("...\n"),
        }
    }
    out
}

pub fn format_fills_table(result: &BacktestResult) -> String {
    let rows = order_fill_rows(result);
    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("(no fills)\n");
    } else {
        let _ = writeln!(
            out,
            "{:<18} {:<14} {:<5} {:>8} {:>10} {:>10} {:<12}",
            "order_id", "instrument", "side", "qty", "avg_px", "commission", "date"
        );
        for row in elide(&rows) {
            match row {
                Some(r) => {
                    let _ = writeln!(
                        out,
                        "{:<18} {:<14} {:<5} {:>8} {:>10.2} {:>10.2} {:<12}",
                        r.client_order_id, r.instrument_id, r.side, r.filled_qty, r.avg_px, r.commission, r.ts_last
                    );
                }
                None => out.push_str("...\n"),
            }
        }
    }

    let denied: Vec<&MarketOrder> = result
        .orders
        .iter()
        .filter(|o| o.status == OrderStatus::Denied)
        .collect();
    if !denied.is_empty() {
        let _ = writeln!(out, "{} order(s) denied:", denied.len());
        for order in denied.iter().take(TABLE_ROWS) {
            let _ = writeln!(out, "  {} {}", order.ts_init, order.summary());
        }
    }
    out
}

/// Summary block of return and trade statistics.
pub fn format_summary(result: &BacktestResult, perf: &PerformanceStats, trades: &TradeStats) -> String {
    let mut out = String::new();
    let pct = ember_common::util::format_pct;
    let _ = writeln!(out, "Strategy:        {}", result.strategy_id);
    if let (Some(start), Some(end)) = (result.start_date, result.end_date) {
        let _ = writeln!(out, "Period:          {} to {}", start, end);
    }
    let _ = writeln!(out, "Starting cash:   {:>14.2} {}", result.starting_cash, result.currency);
    let _ = writeln!(out, "Final equity:    {:>14.2} {}", result.final_equity(), result.currency);
    let _ = writeln!(out, "Total PnL:       {:>14.2}", result.total_pnl());
    let _ = writeln!(out, "Total return:    {:>14}", pct(perf.total_return));
    let _ = writeln!(out, "CAGR:            {:>14}", pct(perf.cagr));
    let _ = writeln!(out, "Sharpe:          {:>14.2}", perf.sharpe);
    let _ = writeln!(out, "Max drawdown:    {:>14}", pct(perf.max_drawdown));
    let _ = writeln!(out, "Trades:          {:>14}", trades.total_trades);
    let _ = writeln!(out, "Win rate:        {:>14}", pct(trades.win_rate));
    let _ = writeln!(out, "Commissions:     {:>14.2}", result.total_commissions);
    out
}

/// Keep the first and last rows of long tables; `None` marks the gap.
fn elide<T>(rows: &[T]) -> Vec<Option<&T>> {
    if rows.len() <= TABLE_ROWS {
        return rows.iter().map(Some).collect();
    }
    let half = TABLE_ROWS / 2;
    rows[..half]
        .iter()
        .map(Some)
        .chain(std::iter::once(None))
        .chain(rows[rows.len() - half..].iter().map(Some))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
