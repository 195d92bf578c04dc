//! Per-instrument price series and the unified trading timeline.

use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct CodeData {
    pub code: String,
    pub ohlcv: Vec<OhlcvBar>,
    pub closes: Vec<f64>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl CodeData {
    /// Bars are sorted by date on construction.
    pub fn new(code: String, mut ohlcv: Vec<OhlcvBar>) -> Self {
        ohlcv.sort_by_key(|b| b.date);
        let date_index = ohlcv
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        let closes = ohlcv.iter().map(|b| b.close).collect();
        Self {
            code,
            ohlcv,
            closes,
            date_index,
        }
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.ohlcv[i])
    }

    /// Number of bars dated on or before `date`.
    pub fn bars_until(&self, date: NaiveDate) -> usize {
        self.ohlcv.partition_point(|b| b.date <= date)
    }

    /// Trailing closes up to and including `date`, oldest first.
    ///
    /// Shorter than `lookback` when not enough bars precede `date`.
    pub fn history(&self, date: NaiveDate, lookback: usize) -> &[f64] {
        let end = self.bars_until(date);
        let start = end.saturating_sub(lookback);
        &self.closes[start..end]
    }

    /// Most recent close on or before `date`.
    pub fn last_close(&self, date: NaiveDate) -> Option<f64> {
        let end = self.bars_until(date);
        end.checked_sub(1).map(|i| self.closes[i])
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.ohlcv.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.ohlcv.last().map(|b| b.date)
    }
}

pub fn build_unified_timeline(codes: &[CodeData]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = codes
        .iter()
        .flat_map(|cd| cd.ohlcv.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}

/// Unified timeline restricted to `[start, end]`.
pub fn trading_days(codes: &[CodeData], start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    build_unified_timeline(codes)
        .into_iter()
        .filter(|d| *d >= start && *d <= end)
        .collect()
}
