//! Correction tracking over a trailing price window.
//!
//! An instrument is "in correction" while its price sits sufficiently below
//! the window peak and the trough since that peak is at least
//! `correction_margin` below it. `days_in_correction` counts consecutive such
//! days and is carried from one simulated day to the next.

use chrono::NaiveDate;

use super::error::CorrexError;
use super::strategy::{Policy, StrategyParams};

/// Trough value reported when there is no trough to speak of.
pub const NO_TROUGH: f64 = -1.0;

/// Per-instrument state carried across simulated days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstrumentState {
    pub days_in_correction: u32,
    pub consider: bool,
}

/// Peak and trough statistics of one full-length window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub price: f64,
    pub peak: f64,
    /// Minimum strictly after the latest peak, or [`NO_TROUGH`] when the peak is today.
    pub trough: f64,
    pub days_since_peak: usize,
}

/// Outcome of one day's tracking for one instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// `None` when the window was too short to use.
    pub stats: Option<WindowStats>,
    pub in_correction: bool,
    /// `days_in_correction` as it stood before today's update.
    pub previous_days_in_correction: u32,
    pub consider: bool,
}

impl Observation {
    pub fn was_in_correction(&self) -> bool {
        self.previous_days_in_correction > 0
    }
}

/// Reject non-positive or non-finite prices.
pub fn validate_window(code: &str, date: NaiveDate, window: &[f64]) -> Result<(), CorrexError> {
    match window.iter().find(|p| !p.is_finite() || **p <= 0.0) {
        Some(&value) => Err(CorrexError::InvalidPrice {
            code: code.to_string(),
            date,
            value,
            context: "trailing price window".to_string(),
        }),
        None => Ok(()),
    }
}

/// Peak value and the index of its latest occurrence.
pub fn find_peak(window: &[f64]) -> Option<(f64, usize)> {
    let mut best: Option<(f64, usize)> = None;
    for (i, &price) in window.iter().enumerate() {
        match best {
            Some((peak, _)) if price < peak => {}
            _ => best = Some((price, i)),
        }
    }
    best
}

/// Peak, trough and days since peak of `window`.
///
/// Returns `None` for an empty window.
pub fn window_stats(window: &[f64]) -> Option<WindowStats> {
    let (peak, peak_index) = find_peak(window)?;
    let last = window.len() - 1;
    let days_since_peak = last - peak_index;
    let trough = if days_since_peak == 0 {
        NO_TROUGH
    } else {
        window[peak_index + 1..]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    };
    Some(WindowStats {
        price: window[last],
        peak,
        trough,
        days_since_peak,
    })
}

pub fn is_in_correction(stats: &WindowStats, correction_margin: f64, min_gain: f64) -> bool {
    stats.price <= stats.peak * (1.0 - min_gain)
        && stats.trough > 0.0
        && stats.trough <= stats.peak * (1.0 - correction_margin)
}

/// Mean of the last `count` simple daily returns ending today.
///
/// `None` when the window holds fewer than `count + 1` prices.
pub fn trailing_mean_return(window: &[f64], count: usize) -> Option<f64> {
    if count == 0 || window.len() < count + 1 {
        return None;
    }
    let tail = &window[window.len() - count - 1..];
    let sum: f64 = tail.windows(2).map(|w| w[1] / w[0] - 1.0).sum();
    Some(sum / count as f64)
}

/// Update `state` from today's trailing window and report what was seen.
///
/// Windows shorter than `params.lookback` make the instrument ineligible for
/// the day: its correction count resets and it is not considered.
pub fn observe(
    state: &mut InstrumentState,
    code: &str,
    date: NaiveDate,
    window: &[f64],
    params: &StrategyParams,
) -> Result<Observation, CorrexError> {
    let previous = state.days_in_correction;

    if window.len() < params.lookback || window.is_empty() {
        state.days_in_correction = 0;
        state.consider = false;
        return Ok(Observation {
            stats: None,
            in_correction: false,
            previous_days_in_correction: previous,
            consider: false,
        });
    }

    validate_window(code, date, window)?;

    let Some(stats) = window_stats(window) else {
        return Err(CorrexError::Data {
            reason: format!("empty price window for {code} on {date}"),
        });
    };

    let in_correction = is_in_correction(&stats, params.correction_margin, params.min_gain);
    state.days_in_correction = if in_correction { previous + 1 } else { 0 };

    state.consider = match params.policy {
        Policy::Stacked { state_threshold } => {
            trailing_mean_return(window, params.consider_window)
                .is_some_and(|mean| mean > state_threshold)
        }
        Policy::Single { .. } => true,
    };

    Ok(Observation {
        stats: Some(stats),
        in_correction,
        previous_days_in_correction: previous,
        consider: state.consider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, 20).unwrap()
    }

    fn params(lookback: usize) -> StrategyParams {
        StrategyParams {
            correction_margin: 0.1,
            min_gain: 0.0,
            lookback,
            ..StrategyParams::single_default()
        }
    }

    #[test]
    fn find_peak_prefers_latest_occurrence() {
        assert_eq!(find_peak(&[1.0, 5.0, 2.0, 5.0, 3.0]), Some((5.0, 3)));
        assert_eq!(find_peak(&[]), None);
    }

    #[test]
    fn trough_is_min_after_peak() {
        let stats = window_stats(&[50.0, 100.0, 80.0, 85.0, 95.0]).unwrap();
        assert_relative_eq!(stats.peak, 100.0);
        assert_relative_eq!(stats.trough, 80.0);
        assert_relative_eq!(stats.price, 95.0);
        assert_eq!(stats.days_since_peak, 3);
    }

    #[test]
    fn trough_ignores_bars_before_peak() {
        let stats = window_stats(&[10.0, 100.0, 90.0]).unwrap();
        assert_relative_eq!(stats.trough, 90.0);
    }

    #[test]
    fn trough_sentinel_when_peak_is_today() {
        let stats = window_stats(&[80.0, 90.0, 100.0]).unwrap();
        assert_eq!(stats.days_since_peak, 0);
        assert_relative_eq!(stats.trough, NO_TROUGH);
    }

    #[test]
    fn correction_predicate() {
        let stats = window_stats(&[100.0, 80.0, 95.0]).unwrap();
        assert!(is_in_correction(&stats, 0.1, 0.0));
        // trough 80 is not 25% below 100
        assert!(!is_in_correction(&stats, 0.25, 0.0));
        // price 95 is above 100 * (1 - 0.07)
        assert!(!is_in_correction(&stats, 0.1, 0.07));
        // negative min_gain lets the price sit above peak * 1
        let stats = window_stats(&[100.0, 80.0, 99.0]).unwrap();
        assert!(is_in_correction(&stats, 0.1, -0.05));
    }

    #[test]
    fn observe_counts_consecutive_days() {
        let p = params(3);
        let mut state = InstrumentState::default();

        let obs = observe(&mut state, "^GSPC", date(), &[100.0, 85.0, 88.0], &p).unwrap();
        assert!(obs.in_correction);
        assert_eq!(obs.previous_days_in_correction, 0);
        assert_eq!(state.days_in_correction, 1);

        observe(&mut state, "^GSPC", date(), &[85.0, 88.0, 86.0], &p).unwrap();
        // window now peaks at 88 (yesterday), trough 86 is not 10% below
        assert_eq!(state.days_in_correction, 0);
    }

    #[test]
    fn observe_resets_at_new_peak() {
        let p = params(3);
        let mut state = InstrumentState {
            days_in_correction: 7,
            consider: true,
        };
        let obs = observe(&mut state, "^GSPC", date(), &[80.0, 90.0, 100.0], &p).unwrap();
        assert!(!obs.in_correction);
        assert!(obs.was_in_correction());
        assert_eq!(state.days_in_correction, 0);
    }

    #[test]
    fn observe_short_window_is_ineligible() {
        let p = params(500);
        let mut state = InstrumentState {
            days_in_correction: 4,
            consider: true,
        };
        let obs = observe(&mut state, "^N225", date(), &[100.0, 80.0], &p).unwrap();
        assert!(obs.stats.is_none());
        assert_eq!(state, InstrumentState::default());
    }

    #[test]
    fn observe_rejects_bad_prices() {
        let p = params(3);
        let mut state = InstrumentState::default();
        let err = observe(&mut state, "^HSI", date(), &[100.0, 0.0, 90.0], &p).unwrap_err();
        match err {
            CorrexError::InvalidPrice { code, value, .. } => {
                assert_eq!(code, "^HSI");
                assert_relative_eq!(value, 0.0);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(observe(&mut state, "^HSI", date(), &[100.0, f64::NAN, 90.0], &p).is_err());
    }

    #[test]
    fn trailing_mean_return_uses_returns_ending_today() {
        let window = [100.0, 200.0, 100.0, 110.0];
        // last two returns: -0.5 and 0.1
        assert_relative_eq!(trailing_mean_return(&window, 2).unwrap(), -0.2);
        assert!(trailing_mean_return(&window, 4).is_none());
    }

    #[test]
    fn consider_flag_follows_state_threshold() {
        let mut p = StrategyParams {
            lookback: 4,
            consider_window: 2,
            ..StrategyParams::stacked_default()
        };
        let window = [100.0, 200.0, 100.0, 110.0];

        p.policy = Policy::Stacked {
            state_threshold: -0.3,
        };
        let mut state = InstrumentState::default();
        assert!(observe(&mut state, "^FTSE", date(), &window, &p).unwrap().consider);

        p.policy = Policy::Stacked {
            state_threshold: 0.0,
        };
        assert!(!observe(&mut state, "^FTSE", date(), &window, &p).unwrap().consider);
    }
}
