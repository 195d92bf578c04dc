//! Parameter search over strategy parameters.
//!
//! Two optimisers share one evaluation path: [`grid`] walks the cartesian
//! product of the configured values, [`bandit`] samples with an
//! explore/exploit schedule. Runs are independent, so each owns its
//! strategy and portfolio state.

pub mod bandit;
pub mod grid;
pub mod space;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{Datelike, NaiveDate};
use rand::Rng;

use super::backtest::{BacktestConfig, run_backtest};
use super::code_data::{CodeData, trading_days};
use super::error::CorrexError;
use super::strategy::StrategyParams;
use space::ParameterSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExploitMetric {
    #[default]
    Return,
    Alpha,
}

impl FromStr for ExploitMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "return" | "mean_daily_return" => Ok(ExploitMetric::Return),
            "alpha" => Ok(ExploitMetric::Alpha),
            other => Err(format!("unknown metric '{other}' (expected return or alpha)")),
        }
    }
}

impl fmt::Display for ExploitMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExploitMetric::Return => write!(f, "return"),
            ExploitMetric::Alpha => write!(f, "alpha"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMethod {
    Grid,
    #[default]
    Bandit,
}

impl FromStr for SearchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grid" => Ok(SearchMethod::Grid),
            "bandit" => Ok(SearchMethod::Bandit),
            other => Err(format!("unknown search method '{other}' (expected grid or bandit)")),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::Grid => write!(f, "grid"),
            SearchMethod::Bandit => write!(f, "bandit"),
        }
    }
}

/// Window length when random timeframes are on and `years` is not set.
pub const DEFAULT_RANDOM_YEARS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub method: SearchMethod,
    pub episodes: usize,
    pub exploit_metric: ExploitMetric,
    pub seed: u64,
    pub parallel: bool,
    /// Length in whole calendar years of random run windows, when enabled.
    pub random_years: Option<u32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            method: SearchMethod::Bandit,
            episodes: 500,
            exploit_metric: ExploitMetric::Return,
            seed: 42,
            parallel: true,
            random_years: None,
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRecord {
    pub mean_daily_return: f64,
    pub alpha: f64,
    pub params: StrategyParams,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SearchRecord {
    pub fn metric(&self, metric: ExploitMetric) -> f64 {
        match metric {
            ExploitMetric::Return => self.mean_daily_return,
            ExploitMetric::Alpha => self.alpha,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub records: Vec<SearchRecord>,
    pub failed: usize,
    pub cancelled: bool,
}

impl SearchOutcome {
    /// Records best first by `metric`; NaN sorts last, ties keep run order.
    pub fn ranked_by(&self, metric: ExploitMetric) -> Vec<&SearchRecord> {
        let mut ranked: Vec<&SearchRecord> = self.records.iter().collect();
        ranked.sort_by(|a, b| sort_key(b.metric(metric)).total_cmp(&sort_key(a.metric(metric))));
        ranked
    }

    pub fn best(&self, metric: ExploitMetric) -> Option<&SearchRecord> {
        best_record(&self.records, metric)
    }
}

fn sort_key(value: f64) -> f64 {
    if value.is_nan() {
        f64::NEG_INFINITY
    } else {
        value
    }
}

/// First record with the highest finite `metric`.
pub fn best_record(records: &[SearchRecord], metric: ExploitMetric) -> Option<&SearchRecord> {
    records
        .iter()
        .filter(|r| r.metric(metric).is_finite())
        .fold(None, |best: Option<&SearchRecord>, r| match best {
            Some(b) if b.metric(metric) >= r.metric(metric) => Some(b),
            _ => Some(r),
        })
}

/// Caller-side stop conditions, checked between runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchControl<'a> {
    pub cancel: Option<&'a AtomicBool>,
    pub deadline: Option<Instant>,
}

impl SearchControl<'_> {
    pub fn should_stop(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::Relaxed))
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Data and fixed settings shared by every run.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub code_data: &'a [CodeData],
    pub benchmark: Option<&'a CodeData>,
    pub config: &'a BacktestConfig,
}

impl SearchContext<'_> {
    pub fn full_window(&self) -> (NaiveDate, NaiveDate) {
        (self.config.start_date, self.config.end_date)
    }

    /// Backtest `params` over `[start, end]`.
    pub fn evaluate(
        &self,
        params: &StrategyParams,
        (start, end): (NaiveDate, NaiveDate),
    ) -> Result<SearchRecord, CorrexError> {
        let timeline = trading_days(self.code_data, start, end);
        if timeline.is_empty() {
            return Err(CorrexError::Search {
                reason: format!("no trading days between {start} and {end}"),
            });
        }
        let config = BacktestConfig {
            start_date: start,
            end_date: end,
            ..self.config.clone()
        };
        let result = run_backtest(self.code_data, &timeline, params, &config, self.benchmark)?;
        let metrics = result.metrics(config.risk_free_rate);
        Ok(SearchRecord {
            mean_daily_return: metrics.mean_daily_return,
            alpha: metrics.alpha,
            params: *params,
            start,
            end,
        })
    }
}

/// A window of `years` whole calendar years starting on a random 1 January
/// between the years of `start` and `end - years`.
pub fn random_timeframe<R: Rng>(
    start: NaiveDate,
    end: NaiveDate,
    years: u32,
    rng: &mut R,
) -> Result<(NaiveDate, NaiveDate), CorrexError> {
    let first = start.year();
    let last = end.year() - years as i32;
    if years == 0 || last < first {
        return Err(CorrexError::Search {
            reason: format!("cannot fit {years} whole years between {start} and {end}"),
        });
    }
    let year = rng.gen_range(first..=last);
    let from = NaiveDate::from_ymd_opt(year, 1, 1);
    let to = NaiveDate::from_ymd_opt(year + years as i32, 1, 1);
    match (from, to) {
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Err(CorrexError::Search {
            reason: format!("invalid timeframe starting in {year}"),
        }),
    }
}

/// Run the configured optimiser.
pub fn run_search(
    ctx: &SearchContext<'_>,
    space: &ParameterSpace,
    config: &SearchConfig,
    control: SearchControl<'_>,
) -> Result<SearchOutcome, CorrexError> {
    match config.method {
        SearchMethod::Grid => grid::grid_search(ctx, space, config, control),
        SearchMethod::Bandit => bandit::bandit_search(ctx, space, config, control),
    }
}
