//! Netting positions and the portfolio that owns them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::order::{OrderFill, OrderSide};

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Flat,
}

/// A long position in one instrument, from the first fill out of flat until
/// the quantity returns to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Position ID
    pub position_id: String,
    pub instrument: String,
    pub strategy_id: String,
    /// Order that opened the position
    pub opening_order_id: String,
    pub side: PositionSide,
    /// Quantity currently held
    pub quantity: u64,
    /// Largest quantity held
    pub peak_qty: u64,
    /// Total quantity sold
    pub sold_qty: u64,
    pub avg_px_open: f64,
    /// Average sell price (0 until the first sell)
    pub avg_px_close: f64,
    /// Realized P&L net of commissions
    pub realized_pnl: f64,
    pub commissions: f64,
    pub ts_opened: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts_closed: Option<NaiveDate>,
    /// Last mark price
    pub last_px: f64,
}

impl Position {
    /// Open a position from a buy fill.
    pub fn open(fill: &OrderFill, strategy_id: &str) -> Self {
        Self {
            position_id: uuid::Uuid::new_v4().to_string(),
            instrument: fill.instrument.clone(),
            strategy_id: strategy_id.to_string(),
            opening_order_id: fill.client_order_id.clone(),
            side: PositionSide::Long,
            quantity: fill.quantity,
            peak_qty: fill.quantity,
            sold_qty: 0,
            avg_px_open: fill.price,
            avg_px_close: 0.0,
            realized_pnl: -fill.commission,
            commissions: fill.commission,
            ts_opened: fill.date,
            ts_closed: None,
            last_px: fill.price,
        }
    }

    pub fn is_open(&self) -> bool {
        self.side == PositionSide::Long
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Apply a fill. Sells never exceed the held quantity.
    pub fn apply(&mut self, fill: &OrderFill) {
        self.commissions += fill.commission;
        self.realized_pnl -= fill.commission;
        self.last_px = fill.price;

        match fill.side {
            OrderSide::Buy => {
                let total = self.quantity + fill.quantity;
                self.avg_px_open = (self.avg_px_open * self.quantity as f64
                    + fill.price * fill.quantity as f64)
                    / total as f64;
                self.quantity = total;
                self.peak_qty = self.peak_qty.max(total);
            }
            OrderSide::Sell => {
                let qty = fill.quantity.min(self.quantity);
                self.realized_pnl += (fill.price - self.avg_px_open) * qty as f64;
                let sold = self.sold_qty + qty;
                self.avg_px_close = (self.avg_px_close * self.sold_qty as f64
                    + fill.price * qty as f64)
                    / sold as f64;
                self.sold_qty = sold;
                self.quantity -= qty;

                if self.quantity == 0 {
                    self.side = PositionSide::Flat;
                    self.ts_closed = Some(fill.date);
                }
            }
        }
    }

    /// Market value at the last mark.
    pub fn market_value(&self) -> f64 {
        self.quantity as f64 * self.last_px
    }

    pub fn unrealized_pnl(&self) -> f64 {
        (self.last_px - self.avg_px_open) * self.quantity as f64
    }

    /// Return of the closing trades relative to the average open price.
    pub fn realized_return(&self) -> f64 {
        if self.sold_qty == 0 || self.avg_px_open <= 0.0 {
            0.0
        } else {
            (self.avg_px_close - self.avg_px_open) / self.avg_px_open
        }
    }

    /// Days from open to close (or to `as_of` while open).
    pub fn holding_days(&self, as_of: NaiveDate) -> i64 {
        (self.ts_closed.unwrap_or(as_of) - self.ts_opened).num_days()
    }
}

// ============================================================================
// Portfolio
// ============================================================================

/// Netting portfolio: at most one open position per instrument.
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    open: BTreeMap<String, Position>,
    closed: Vec<Position>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a fill, opening a position from flat. Returns the position ID.
    pub fn apply_fill(&mut self, fill: &OrderFill, strategy_id: &str) -> Option<String> {
        match self.open.get_mut(&fill.instrument) {
            Some(position) => {
                position.apply(fill);
                let id = position.position_id.clone();
                if position.is_closed() {
                    if let Some(done) = self.open.remove(&fill.instrument) {
                        self.closed.push(done);
                    }
                }
                Some(id)
            }
            None if fill.side == OrderSide::Buy => {
                let position = Position::open(fill, strategy_id);
                let id = position.position_id.clone();
                self.open.insert(fill.instrument.clone(), position);
                Some(id)
            }
            None => None,
        }
    }

    /// Update the mark price of an open position.
    pub fn mark(&mut self, instrument: &str, price: f64) {
        if let Some(position) = self.open.get_mut(instrument) {
            position.last_px = price;
        }
    }

    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.open.get(instrument)
    }

    pub fn net_quantity(&self, instrument: &str) -> u64 {
        self.open.get(instrument).map_or(0, |p| p.quantity)
    }

    pub fn is_net_long(&self, instrument: &str) -> bool {
        self.net_quantity(instrument) > 0
    }

    pub fn is_flat(&self, instrument: &str) -> bool {
        !self.is_net_long(instrument)
    }

    pub fn is_completely_flat(&self) -> bool {
        self.open.is_empty()
    }

    /// Open positions in instrument order.
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    /// Closed positions in closing order.
    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    /// Every position ever held, ordered by open date.
    pub fn all_positions(&self) -> Vec<Position> {
        let mut all: Vec<Position> = self
            .closed
            .iter()
            .chain(self.open.values())
            .cloned()
            .collect();
        all.sort_by(|a, b| {
            a.ts_opened
                .cmp(&b.ts_opened)
                .then_with(|| a.instrument.cmp(&b.instrument))
        });
        all
    }

    /// Sum of open position market values.
    pub fn market_value(&self) -> f64 {
        self.open.values().map(Position::market_value).sum()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed
            .iter()
            .chain(self.open.values())
            .map(|p| p.realized_pnl)
            .sum()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.open.values().map(Position::unrealized_pnl).sum()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn fill(side: OrderSide, qty: u64, price: f64, day: u32) -> OrderFill {
        OrderFill {
            client_order_id: format!("O-{}", day),
            instrument: "AAPL".to_string(),
            side,
            quantity: qty,
            price,
            commission: 0.0,
            date: d(day),
        }
    }

    #[test]
    fn test_open_add_close_cycle() {
        let mut portfolio = Portfolio::new();
        assert!(portfolio.is_flat("AAPL"));

        let first = portfolio.apply_fill(&fill(OrderSide::Buy, 10, 100.0, 2), "S").unwrap();
        portfolio.apply_fill(&fill(OrderSide::Buy, 10, 110.0, 3), "S");
        assert!(portfolio.is_net_long("AAPL"));
        assert_eq!(portfolio.net_quantity("AAPL"), 20);
        assert_eq!(portfolio.position("AAPL").unwrap().avg_px_open, 105.0);

        portfolio.apply_fill(&fill(OrderSide::Sell, 5, 120.0, 4), "S");
        assert_eq!(portfolio.net_quantity("AAPL"), 15);

        let closing = portfolio.apply_fill(&fill(OrderSide::Sell, 15, 100.0, 5), "S").unwrap();
        assert_eq!(first, closing);
        assert!(portfolio.is_flat("AAPL"));
        assert!(portfolio.is_completely_flat());

        let closed = &portfolio.closed_positions()[0];
        assert_eq!(closed.peak_qty, 20);
        assert_eq!(closed.ts_closed, Some(d(5)));
        // 5 * (120 - 105) + 15 * (100 - 105)
        assert!((closed.realized_pnl - 0.0).abs() < 1e-9);
        assert!((closed.avg_px_close - 105.0).abs() < 1e-9);
        assert_eq!(closed.realized_return(), 0.0);
        assert_eq!(closed.holding_days(d(31)), 3);
    }

    #[test]
    fn test_reopen_gets_new_id() {
        let mut portfolio = Portfolio::new();
        let a = portfolio.apply_fill(&fill(OrderSide::Buy, 1, 10.0, 2), "S").unwrap();
        portfolio.apply_fill(&fill(OrderSide::Sell, 1, 12.0, 3), "S");
        let b = portfolio.apply_fill(&fill(OrderSide::Buy, 1, 11.0, 4), "S").unwrap();

        assert_ne!(a, b);
        assert_eq!(portfolio.all_positions().len(), 2);
        assert!((portfolio.realized_pnl() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sell_from_flat_is_ignored() {
        let mut portfolio = Portfolio::new();
        assert!(portfolio.apply_fill(&fill(OrderSide::Sell, 1, 10.0, 2), "S").is_none());
        assert!(portfolio.is_completely_flat());
    }

    #[test]
    fn test_mark_to_market() {
        let mut portfolio = Portfolio::new();
        portfolio.apply_fill(&fill(OrderSide::Buy, 10, 100.0, 2), "S");
        portfolio.mark("AAPL", 90.0);

        assert_eq!(portfolio.market_value(), 900.0);
        assert_eq!(portfolio.unrealized_pnl(), -100.0);
    }
}
