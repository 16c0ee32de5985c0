//! Market orders and their fills.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Created, not yet processed by the venue
    Initialized,
    /// Fully filled at the close
    Filled,
    /// Refused before reaching the venue (insufficient cash, short sale, ...)
    Denied,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "INITIALIZED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Denied => write!(f, "DENIED"),
        }
    }
}

/// A market order for whole shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOrder {
    /// Client order ID (`O-{yyyymmdd}-{seq}`)
    pub client_order_id: String,
    /// Instrument symbol
    pub instrument: String,
    /// Submitting strategy
    pub strategy_id: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub status: OrderStatus,
    pub filled_qty: u64,
    /// Fill price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_px: Option<f64>,
    pub commission: f64,
    /// Date the order was created
    pub ts_init: NaiveDate,
    /// Date of the last status change
    pub ts_last: NaiveDate,
    /// Denial reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MarketOrder {
    pub fn new(
        client_order_id: impl Into<String>,
        strategy_id: impl Into<String>,
        instrument: impl Into<String>,
        side: OrderSide,
        quantity: u64,
        date: NaiveDate,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            instrument: instrument.into(),
            strategy_id: strategy_id.into(),
            side,
            quantity,
            status: OrderStatus::Initialized,
            filled_qty: 0,
            avg_px: None,
            commission: 0.0,
            ts_init: date,
            ts_last: date,
            reason: None,
        }
    }

    /// Mark the whole quantity filled at `price`.
    pub fn fill(&mut self, price: f64, commission: f64, date: NaiveDate) {
        self.filled_qty = self.quantity;
        self.avg_px = Some(price);
        self.commission = commission;
        self.status = OrderStatus::Filled;
        self.ts_last = date;
    }

    pub fn deny(&mut self, reason: impl Into<String>, date: NaiveDate) {
        self.status = OrderStatus::Denied;
        self.reason = Some(reason.into());
        self.ts_last = date;
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Signed quantity: positive for buys.
    pub fn signed_qty(&self) -> i64 {
        match self.side {
            OrderSide::Buy => self.quantity as i64,
            OrderSide::Sell => -(self.quantity as i64),
        }
    }

    pub fn summary(&self) -> String {
        match (self.status, self.avg_px) {
            (OrderStatus::Filled, Some(px)) => format!(
                "{} {} {} @ {:.2}",
                self.side, self.quantity, self.instrument, px
            ),
            _ => format!(
                "{} {} {} [{}{}]",
                self.side,
                self.quantity,
                self.instrument,
                self.status,
                self.reason
                    .as_deref()
                    .map(|r| format!(": {}", r))
                    .unwrap_or_default()
            ),
        }
    }
}

/// An executed fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub client_order_id: String,
    pub instrument: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub price: f64,
    pub commission: f64,
    pub date: NaiveDate,
}

impl OrderFill {
    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.price
    }
}

// ============================================================================
// Tests
// ============================================================================
