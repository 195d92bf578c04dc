//! Rolling analytics over a daily series.
//!
//! Every rolling value at index `t` uses the `window` observations strictly
//! before `t`; indices without a full window are `None`.

use chrono::{Datelike, NaiveDate};

pub const SHARPE_WINDOW: usize = 90;
pub const STD_WINDOWS: [usize; 3] = [90, 180, 365];
pub const MA_WINDOWS: [usize; 2] = [180, 365];

fn rolling<F>(values: &[f64], window: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    (0..values.len())
        .map(|t| {
            if window == 0 || t < window {
                None
            } else {
                Some(f(&values[t - window..t]))
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; zero for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

pub fn moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, mean)
}

pub fn rolling_std(returns: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(returns, window, sample_std)
}

/// Un-annualized Sharpe ratio of each trailing window.
pub fn rolling_sharpe(returns: &[f64], window: usize, risk_free: f64) -> Vec<Option<f64>> {
    rolling(returns, window, |w| {
        let std = sample_std(w);
        if std > 0.0 {
            (mean(w) - risk_free) / std
        } else {
            0.0
        }
    })
}

/// Un-annualized Sortino ratio: excess mean over the deviation of returns below `mar`.
pub fn rolling_sortino(returns: &[f64], window: usize, mar: f64) -> Vec<Option<f64>> {
    rolling(returns, window, |w| {
        let downside: Vec<f64> = w.iter().copied().filter(|r| *r < mar).collect();
        let std = sample_std(&downside);
        if std > 0.0 {
            (mean(w) - mar) / std
        } else {
            0.0
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    /// First day of the calendar quarter.
    pub quarter: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = (date.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

/// OHLC of `series` per calendar quarter. Input must be date ordered.
pub fn quarterly_candles(series: &[(NaiveDate, f64)]) -> Vec<Candle> {
    let mut candles: Vec<Candle> = Vec::new();
    for &(date, value) in series {
        let quarter = quarter_start(date);
        match candles.last_mut() {
            Some(c) if c.quarter == quarter => {
                c.high = c.high.max(value);
                c.low = c.low.min(value);
                c.close = value;
            }
            _ => candles.push(Candle {
                quarter,
                open: value,
                high: value,
                low: value,
                close: value,
            }),
        }
    }
    candles
}
