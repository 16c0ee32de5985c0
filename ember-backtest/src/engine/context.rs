//! The view of the simulated venue handed to strategy callbacks.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::data::MarketData;
use crate::execution::{
    AccountSnapshot, CashAccount, MarketOrder, OrderFill, OrderSide, OrderStatus, Portfolio,
};

/// Trading context passed to every strategy callback.
///
/// Orders fill as soon as they are submitted, at the instrument's last close,
/// so the portfolio and cash seen right after a submit already reflect it.
pub struct StrategyContext {
    strategy_id: String,
    commission_rate: f64,
    market_data: Arc<MarketData>,
    account: CashAccount,
    portfolio: Portfolio,
    instruments: BTreeSet<String>,
    subscriptions: BTreeSet<String>,
    last_prices: BTreeMap<String, f64>,
    orders: Vec<MarketOrder>,
    fills: Vec<OrderFill>,
    current_date: Option<NaiveDate>,
    order_seq: u64,
}

impl StrategyContext {
    pub(crate) fn new(
        strategy_id: impl Into<String>,
        account: CashAccount,
        commission_rate: f64,
        instruments: BTreeSet<String>,
        market_data: Arc<MarketData>,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            commission_rate,
            market_data,
            account,
            portfolio: Portfolio::new(),
            instruments,
            subscriptions: BTreeSet::new(),
            last_prices: BTreeMap::new(),
            orders: Vec::new(),
            fills: Vec::new(),
            current_date: None,
            order_seq: 0,
        }
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Receive `on_bar` for `symbol`. Returns false for unknown instruments.
    pub fn subscribe_bars(&mut self, symbol: &str) -> bool {
        if !self.instruments.contains(symbol) {
            warn!(symbol, "Cannot subscribe: instrument has no bar data");
            return false;
        }
        if self.subscriptions.insert(symbol.to_string()) {
            debug!(symbol, "Subscribed to bars");
        }
        true
    }

    pub fn unsubscribe_bars(&mut self, symbol: &str) {
        if self.subscriptions.remove(symbol) {
            debug!(symbol, "Unsubscribed from bars");
        }
    }

    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.subscriptions.contains(symbol)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &String> {
        self.subscriptions.iter()
    }

    /// Instruments with bar data in this run.
    pub fn instruments(&self) -> impl Iterator<Item = &String> {
        self.instruments.iter()
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Submit a market order; it fills immediately or is denied.
    pub fn submit_market_order(&mut self, symbol: &str, side: OrderSide, quantity: u64) -> OrderStatus {
        let date = self.current_date.unwrap_or_default();
        self.order_seq += 1;
        let client_order_id = format!("O-{}-{:06}", date.format("%Y%m%d"), self.order_seq);
        let mut order = MarketOrder::new(
            client_order_id,
            self.strategy_id.as_str(),
            symbol,
            side,
            quantity,
            date,
        );

        match self.check_order(&order) {
            Err(reason) => {
                warn!(
                    order_id = %order.client_order_id,
                    symbol,
                    side = %side,
                    quantity,
                    reason = %reason,
                    "Order denied"
                );
                order.deny(reason, date);
            }
            Ok(price) => {
                let notional = price * quantity as f64;
                let commission = notional * self.commission_rate;
                match side {
                    OrderSide::Buy => self.account.debit(notional, commission),
                    OrderSide::Sell => self.account.credit(notional, commission),
                }
                order.fill(price, commission, date);

                let fill = OrderFill {
                    client_order_id: order.client_order_id.clone(),
                    instrument: symbol.to_string(),
                    side,
                    quantity,
                    price,
                    commission,
                    date,
                };
                self.portfolio.apply_fill(&fill, &self.strategy_id);
                self.fills.push(fill);

                info!(
                    order_id = %order.client_order_id,
                    %date,
                    cash = self.account.cash(),
                    "Filled {}",
                    order.summary()
                );
            }
        }

        let status = order.status;
        self.orders.push(order);
        status
    }

    /// Validate an order against the account, returning the fill price.
    fn check_order(&self, order: &MarketOrder) -> Result<f64, String> {
        if order.quantity == 0 {
            return Err("quantity must be positive".to_string());
        }
        if !self.instruments.contains(&order.instrument) {
            return Err(format!("unknown instrument {}", order.instrument));
        }
        let price = self
            .last_prices
            .get(&order.instrument)
            .copied()
            .ok_or_else(|| "no market price yet".to_string())?;

        match order.side {
            OrderSide::Buy => {
                let notional = price * order.quantity as f64;
                let required = notional * (1.0 + self.commission_rate);
                if !self.account.can_afford(required) {
                    return Err(format!(
                        "insufficient cash: required {:.2}, free {:.2}",
                        required,
                        self.account.cash()
                    ));
                }
            }
            OrderSide::Sell => {
                let held = self.portfolio.net_quantity(&order.instrument);
                if order.quantity > held {
                    return Err(format!(
                        "sell quantity {} exceeds long position {}",
                        order.quantity, held
                    ));
                }
            }
        }
        Ok(price)
    }

    pub fn buy(&mut self, symbol: &str, quantity: u64) -> OrderStatus {
        self.submit_market_order(symbol, OrderSide::Buy, quantity)
    }

    pub fn sell(&mut self, symbol: &str, quantity: u64) -> OrderStatus {
        self.submit_market_order(symbol, OrderSide::Sell, quantity)
    }

    /// Flatten the position in `symbol`, if any.
    pub fn close_all_positions(&mut self, symbol: &str) -> Option<OrderStatus> {
        let held = self.portfolio.net_quantity(symbol);
        (held > 0).then(|| self.sell(symbol, held))
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Free cash.
    pub fn cash(&self) -> f64 {
        self.account.cash()
    }

    /// Cash plus the mark-to-market value of open positions.
    pub fn equity(&self) -> f64 {
        self.account.cash() + self.portfolio.market_value()
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_prices.get(symbol).copied()
    }

    /// Full loaded history, including bars outside the run window.
    pub fn market_data(&self) -> &MarketData {
        &self.market_data
    }

    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current_date
    }

    pub fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    // ========================================================================
    // Engine hooks
    // ========================================================================

    pub(crate) fn set_date(&mut self, date: NaiveDate) {
        self.current_date = Some(date);
    }

    pub(crate) fn update_price(&mut self, symbol: &str, price: f64) {
        self.last_prices.insert(symbol.to_string(), price);
        self.portfolio.mark(symbol, price);
    }

    pub(crate) fn snapshot(&self) -> Option<AccountSnapshot> {
        self.current_date
            .map(|date| self.account.snapshot(date, self.portfolio.market_value()))
    }

    pub(crate) fn account(&self) -> &CashAccount {
        &self.account
    }

    pub(crate) fn into_parts(self) -> (Vec<MarketOrder>, Vec<OrderFill>, Portfolio) {
        (self.orders, self.fills, self.portfolio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(cash: f64, commission_rate: f64) -> StrategyContext {
        let instruments = ["AAPL", "MSFT"].iter().map(|s| s.to_string()).collect();
        let mut ctx = StrategyContext::new(
            "TEST-001",
            CashAccount::new("NYSE-001", "USD", cash),
            commission_rate,
            instruments,
            Arc::new(MarketData::default()),
        );
        ctx.set_date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        ctx.update_price("AAPL", 100.0);
        ctx
    }

    #[test]
    fn test_buy_fills_at_last_price() {
        let mut ctx = context(10_000.0, 0.0);
        assert_eq!(ctx.buy("AAPL", 10), OrderStatus::Filled);
        assert_eq!(ctx.cash(), 9_000.0);
        assert_eq!(ctx.equity(), 10_000.0);
        assert!(ctx.portfolio().is_net_long("AAPL"));
    }

    #[test]
    fn test_over_budget_buy_denied() {
        let mut ctx = context(1_000.0, 0.001);
        // 10 * 100 + 1.0 commission > 1000
        assert_eq!(ctx.buy("AAPL", 10), OrderStatus::Denied);
        assert_eq!(ctx.cash(), 1_000.0);
        assert_eq!(ctx.buy("AAPL", 9), OrderStatus::Filled);
    }

    #[test]
    fn test_short_sale_denied() {
        let mut ctx = context(10_000.0, 0.0);
        assert_eq!(ctx.sell("AAPL", 1), OrderStatus::Denied);
        ctx.buy("AAPL", 5);
        assert_eq!(ctx.sell("AAPL", 6), OrderStatus::Denied);
        assert_eq!(ctx.close_all_positions("AAPL"), Some(OrderStatus::Filled));
        assert_eq!(ctx.close_all_positions("AAPL"), None);
    }

    #[test]
    fn test_orders_without_price_or_instrument_denied() {
        let mut ctx = context(10_000.0, 0.0);
        assert_eq!(ctx.buy("MSFT", 1), OrderStatus::Denied);
        assert_eq!(ctx.buy("NVDA", 1), OrderStatus::Denied);
        assert_eq!(ctx.buy("AAPL", 0), OrderStatus::Denied);

        let (orders, fills, _) = ctx.into_parts();
        assert_eq!(orders.len(), 3);
        assert!(fills.is_empty());
        assert!(orders.iter().all(|o| o.reason.is_some()));
    }

    #[test]
    fn test_subscribe_requires_instrument() {
        let mut ctx = context(10_000.0, 0.0);
        assert!(ctx.subscribe_bars("AAPL"));
        assert!(!ctx.subscribe_bars("NVDA"));
        assert!(ctx.is_subscribed("AAPL"));
        ctx.unsubscribe_bars("AAPL");
        assert!(!ctx.is_subscribed("AAPL"));
    }
}
