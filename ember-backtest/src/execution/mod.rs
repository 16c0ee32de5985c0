//! Simulated execution: market orders, netting positions, and a cash account.
//!
//! Orders fill in full at the instrument's last close. A cash account cannot
//! borrow, so buys beyond free cash and sells beyond the long quantity are
//! denied rather than filled.

mod account;
mod order;
mod position;

pub use account::{AccountSnapshot, CashAccount};
pub use order::{MarketOrder, OrderFill, OrderSide, OrderStatus};
pub use position::{Portfolio, Position, PositionSide};
