//! Portfolio state and equity tracking.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::position::{ClosedTrade, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn get_position(&self, code: &str) -> Option<&Position> {
        self.positions.get(code)
    }

    pub fn get_position_mut(&mut self, code: &str) -> Option<&mut Position> {
        self.positions.get_mut(code)
    }

    pub fn has_position(&self, code: &str) -> bool {
        self.positions.contains_key(code)
    }

    pub fn remove_position(&mut self, code: &str) -> Option<Position> {
        self.positions.remove(code)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Shares held in `code`, zero when flat.
    pub fn shares(&self, code: &str) -> i64 {
        self.positions.get(code).map_or(0, |p| p.quantity)
    }

    pub fn holdings(&self) -> HashMap<String, i64> {
        self.positions
            .values()
            .map(|p| (p.code.clone(), p.quantity))
            .collect()
    }

    /// Record a buy, opening the position or adding to it.
    pub fn buy(&mut self, code: &str, quantity: i64, price: f64, date: NaiveDate, commission: f64) {
        self.cash -= quantity as f64 * price + commission;
        match self.positions.get_mut(code) {
            Some(pos) => pos.add_shares(quantity, price, commission),
            None => {
                self.positions.insert(
                    code.to_string(),
                    Position::new(code, quantity, price, date, commission),
                );
            }
        }
    }

    pub fn record_trade(&mut self, trade: ClosedTrade) {
        self.closed_trades.push(trade);
    }

    pub fn record_equity(&mut self, date: NaiveDate, equity: f64) {
        self.equity_curve.push(EquityPoint { date, equity });
    }

    pub fn total_equity(&self, price_map: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .filter_map(|pos| {
                price_map
                    .get(&pos.code)
                    .map(|&price| pos.market_value(price))
            })
            .sum();
        self.cash + position_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(100000.0);
        assert!((portfolio.cash - 100000.0).abs() < f64::EPSILON);
        assert!((portfolio.initial_capital - 100000.0).abs() < f64::EPSILON);
        assert!(portfolio.positions.is_empty());
        assert!(portfolio.closed_trades.is_empty());
        assert!(portfolio.equity_curve.is_empty());
    }

    #[test]
    fn buy_opens_then_adds() {
        let mut portfolio = Portfolio::new(100000.0);
        portfolio.buy("^FTSE", 10, 100.0, date(), 15.0);
        assert_eq!(portfolio.shares("^FTSE"), 10);
        assert!((portfolio.cash - (100000.0 - 1015.0)).abs() < f64::EPSILON);

        portfolio.buy("^FTSE", 10, 200.0, date(), 15.0);
        let pos = portfolio.get_position("^FTSE").unwrap();
        assert_eq!(pos.quantity, 20);
        assert!((pos.entry_price - 150.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.position_count(), 1);
    }

    #[test]
    fn shares_and_holdings() {
        let mut portfolio = Portfolio::new(100000.0);
        assert_eq!(portfolio.shares("^HSI"), 0);
        portfolio.buy("^HSI", 3, 10.0, date(), 0.0);
        portfolio.buy("^N225", 4, 10.0, date(), 0.0);
        let holdings = portfolio.holdings();
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings["^N225"], 4);
    }

    #[test]
    fn remove_nonexistent_position() {
        let mut portfolio = Portfolio::new(100000.0);
        assert!(portfolio.remove_position("XYZ").is_none());
        assert!(!portfolio.has_position("XYZ"));
    }

    #[test]
    fn record_equity() {
        let mut portfolio = Portfolio::new(100000.0);
        portfolio.record_equity(date(), 105000.0);
        assert_eq!(portfolio.equity_curve.len(), 1);
        assert_eq!(portfolio.equity_curve[0].date, date());
        assert!((portfolio.equity_curve[0].equity - 105000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_equity_uses_market_value() {
        let mut portfolio = Portfolio::new(50000.0);
        portfolio.buy("^GDAXI", 100, 100.0, date(), 0.0);

        let mut price_map = HashMap::new();
        price_map.insert("^GDAXI".to_string(), 150.0);

        let equity = portfolio.total_equity(&price_map);
        assert!((equity - 55000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn total_equity_no_positions() {
        let portfolio = Portfolio::new(100000.0);
        let equity = portfolio.total_equity(&HashMap::new());
        assert!((equity - 100000.0).abs() < f64::EPSILON);
    }
}
