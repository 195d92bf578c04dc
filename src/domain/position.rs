//! Open positions and closed trade records.

use chrono::NaiveDate;

/// A long holding in one instrument, valued at average cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub code: String,
    pub quantity: i64,
    /// Average execution price over all buys still held.
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    /// Buy commissions not yet attributed to a closed trade.
    pub entry_commission: f64,
}

impl Position {
    pub fn new(code: &str, quantity: i64, price: f64, date: NaiveDate, commission: f64) -> Self {
        Position {
            code: code.to_string(),
            quantity,
            entry_price: price,
            entry_date: date,
            entry_commission: commission,
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.entry_price)
    }

    /// Add shares bought at `price`, folding them into the average cost.
    pub fn add_shares(&mut self, quantity: i64, price: f64, commission: f64) {
        let total = self.quantity + quantity;
        if total > 0 {
            self.entry_price = (self.quantity as f64 * self.entry_price
                + quantity as f64 * price)
                / total as f64;
        }
        self.quantity = total;
        self.entry_commission += commission;
    }

    /// Remove `quantity` shares, returning the share of entry commission they carried.
    pub fn remove_shares(&mut self, quantity: i64) -> f64 {
        let quantity = quantity.min(self.quantity);
        let portion = if self.quantity > 0 {
            self.entry_commission * quantity as f64 / self.quantity as f64
        } else {
            0.0
        };
        self.quantity -= quantity;
        self.entry_commission -= portion;
        portion
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub code: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    /// Net of both legs' commissions.
    pub pnl: f64,
}
