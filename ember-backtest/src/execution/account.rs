//! Cash account: no margin, no leverage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily account state recorded by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub date: NaiveDate,
    /// Free cash
    pub cash: f64,
    /// Mark-to-market value of open positions
    pub position_value: f64,
    /// `cash + position_value`
    pub total: f64,
    pub currency: String,
}

/// Single-currency cash account.
#[derive(Debug, Clone)]
pub struct CashAccount {
    pub account_id: String,
    pub currency: String,
    pub starting_balance: f64,
    cash: f64,
    commissions: f64,
}

impl CashAccount {
    pub fn new(account_id: impl Into<String>, currency: impl Into<String>, starting_balance: f64) -> Self {
        Self {
            account_id: account_id.into(),
            currency: currency.into(),
            starting_balance,
            cash: starting_balance,
            commissions: 0.0,
        }
    }

    /// Free cash.
    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Total commissions paid.
    pub fn commissions(&self) -> f64 {
        self.commissions
    }

    /// Whether `amount` can be paid from free cash.
    pub fn can_afford(&self, amount: f64) -> bool {
        amount <= self.cash + 1e-9
    }

    /// Pay for a buy.
    pub fn debit(&mut self, notional: f64, commission: f64) {
        self.cash -= notional + commission;
        self.commissions += commission;
    }

    /// Receive sale proceeds.
    pub fn credit(&mut self, notional: f64, commission: f64) {
        self.cash += notional - commission;
        self.commissions += commission;
    }

    pub fn snapshot(&self, date: NaiveDate, position_value: f64) -> AccountSnapshot {
        AccountSnapshot {
            date,
            cash: self.cash,
            position_value,
            total: self.cash + position_value,
            currency: self.currency.clone(),
        }
    }
}
