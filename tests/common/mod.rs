#![allow(dead_code)]

use chrono::NaiveDate;
use correx::domain::backtest::BacktestConfig;
use correx::domain::code_data::CodeData;
use correx::domain::error::CorrexError;
pub use correx::domain::ohlcv::OhlcvBar;
use correx::domain::strategy::StrategyParams;
use correx::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, CorrexError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(CorrexError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, CorrexError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, CorrexError> {
        match self.data.get(code) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One bar per calendar day from 2020-01-01.
pub fn bars_from(code: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    let start = date(2020, 1, 1);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            code: code.to_string(),
            date: start + chrono::Days::new(i as u64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        })
        .collect()
}

/// Flat at 100, a 20% drop, a recovery to 95, then a steady climb.
///
/// With a 5 bar lookback, margin 0.1 and coefficient 0.1 the instrument is
/// upturning on day 6 (price 85 against a required 83.2).
pub fn correction_series() -> Vec<f64> {
    let mut closes = vec![100.0, 100.0, 100.0, 100.0, 100.0, 80.0, 85.0, 95.0];
    closes.extend((0..32).map(|i| 96.0 + i as f64));
    closes
}

pub fn flat_series(price: f64, count: usize) -> Vec<f64> {
    vec![price; count]
}

pub fn make_code_data(code: &str, closes: &[f64]) -> CodeData {
    CodeData::new(code.to_string(), bars_from(code, closes))
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        start_date: date(2020, 1, 1),
        end_date: date(2020, 12, 31),
        initial_capital: 100_000.0,
        commission_per_trade: 0.0,
        commission_pct: 0.0,
        slippage_pct: 0.0,
        risk_free_rate: 0.0,
    }
}

pub fn short_window(params: StrategyParams) -> StrategyParams {
    StrategyParams {
        correction_margin: 0.1,
        upturn_coefficient: 0.1,
        min_gain: 0.0,
        lookback: 5,
        consider_window: 2,
        ..params
    }
}

pub fn single_params() -> StrategyParams {
    short_window(StrategyParams::single_default())
}

pub fn stacked_params() -> StrategyParams {
    short_window(StrategyParams::stacked_default())
}
