//! Simulation harness view consumed by the decision engine.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Read-only state the harness exposes to the strategy for the current day.
pub trait MarketPort {
    /// The simulated trading day.
    fn date(&self) -> NaiveDate;

    /// Up to `lookback` trailing closes for `code`, oldest first. Short when
    /// the instrument has less history.
    fn history(&self, code: &str, lookback: usize) -> &[f64];

    fn portfolio_value(&self) -> f64;

    fn holdings(&self) -> HashMap<String, i64>;

    /// Instruments with an unfilled order.
    fn open_orders(&self) -> HashSet<String>;
}
