//! Strategy parameters for the market-correction policy.
//!
//! One `StrategyParams` value configures one backtest run. It is passed by
//! reference into the decision engine and never mutated during the run.

use std::fmt;
use std::str::FromStr;

/// Bars of trailing history the correction tracker inspects.
pub const DEFAULT_LOOKBACK: usize = 500;

/// Number of trailing daily returns averaged for the consider flag.
pub const DEFAULT_CONSIDER_WINDOW: usize = 10;

/// How the potential gain of a candidate is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GainMetric {
    /// `peak - price / price`, i.e. `peak - 1`. Kept for compatibility with
    /// historical optimisation results.
    #[default]
    Raw,
    /// `(peak - price) / price`.
    Normalized,
}

impl FromStr for GainMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(GainMetric::Raw),
            "normalized" | "normalised" => Ok(GainMetric::Normalized),
            other => Err(format!("unknown gain metric '{other}' (expected raw or normalized)")),
        }
    }
}

impl fmt::Display for GainMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GainMetric::Raw => write!(f, "raw"),
            GainMetric::Normalized => write!(f, "normalized"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Single,
    Stacked,
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(PolicyKind::Single),
            "stacked" | "multiple" => Ok(PolicyKind::Stacked),
            other => Err(format!("unknown policy '{other}' (expected single or stacked)")),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Single => write!(f, "single"),
            PolicyKind::Stacked => write!(f, "stacked"),
        }
    }
}

/// Allocation policy and its policy-specific parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Policy {
    /// Hold at most one instrument with 100% of portfolio value.
    Single { min_return: f64, stop_loss: f64 },
    /// Spread capital over the ranked candidates one share at a time.
    Stacked { state_threshold: f64 },
}

impl Policy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Single { .. } => PolicyKind::Single,
            Policy::Stacked { .. } => PolicyKind::Stacked,
        }
    }
}

/// Tunable parameters, addressable by name for the optimisers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    CorrectionMargin,
    UpturnCoefficient,
    MinGain,
    MinReturn,
    StopLoss,
    StateThreshold,
}

impl Param {
    pub const SINGLE: [Param; 5] = [
        Param::CorrectionMargin,
        Param::UpturnCoefficient,
        Param::MinReturn,
        Param::MinGain,
        Param::StopLoss,
    ];

    pub const STACKED: [Param; 4] = [
        Param::CorrectionMargin,
        Param::UpturnCoefficient,
        Param::MinGain,
        Param::StateThreshold,
    ];

    pub fn for_policy(kind: PolicyKind) -> &'static [Param] {
        match kind {
            PolicyKind::Single => &Self::SINGLE,
            PolicyKind::Stacked => &Self::STACKED,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Param::CorrectionMargin => "correction_margin",
            Param::UpturnCoefficient => "upturn_coefficient",
            Param::MinGain => "min_gain",
            Param::MinReturn => "min_return",
            Param::StopLoss => "stop_loss",
            Param::StateThreshold => "state_threshold",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyParams {
    /// Drawdown from peak that counts as a correction.
    pub correction_margin: f64,
    /// Scales the upturn required over the trough.
    pub upturn_coefficient: f64,
    /// How far below peak the price must sit to stay in correction. May be negative.
    pub min_gain: f64,
    pub policy: Policy,
    pub lookback: usize,
    pub consider_window: usize,
    pub gain_metric: GainMetric,
}

impl StrategyParams {
    pub fn single_default() -> Self {
        StrategyParams {
            correction_margin: 0.1,
            upturn_coefficient: 0.22,
            min_gain: 0.07,
            policy: Policy::Single {
                min_return: 0.26,
                stop_loss: 0.53,
            },
            lookback: DEFAULT_LOOKBACK,
            consider_window: DEFAULT_CONSIDER_WINDOW,
            gain_metric: GainMetric::Raw,
        }
    }

    pub fn stacked_default() -> Self {
        StrategyParams {
            correction_margin: 0.05,
            upturn_coefficient: 0.0727,
            min_gain: -0.05,
            policy: Policy::Stacked {
                state_threshold: -10.0,
            },
            lookback: DEFAULT_LOOKBACK,
            consider_window: DEFAULT_CONSIDER_WINDOW,
            gain_metric: GainMetric::Raw,
        }
    }

    pub fn defaults_for(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Single => Self::single_default(),
            PolicyKind::Stacked => Self::stacked_default(),
        }
    }

    /// Value of `param`, or `None` when the current policy has no such parameter.
    pub fn value(&self, param: Param) -> Option<f64> {
        match (param, self.policy) {
            (Param::CorrectionMargin, _) => Some(self.correction_margin),
            (Param::UpturnCoefficient, _) => Some(self.upturn_coefficient),
            (Param::MinGain, _) => Some(self.min_gain),
            (Param::MinReturn, Policy::Single { min_return, .. }) => Some(min_return),
            (Param::StopLoss, Policy::Single { stop_loss, .. }) => Some(stop_loss),
            (Param::StateThreshold, Policy::Stacked { state_threshold }) => Some(state_threshold),
            _ => None,
        }
    }

    /// Copy with `param` replaced. Parameters foreign to the policy are ignored.
    pub fn with_value(mut self, param: Param, value: f64) -> Self {
        match (param, &mut self.policy) {
            (Param::CorrectionMargin, _) => self.correction_margin = value,
            (Param::UpturnCoefficient, _) => self.upturn_coefficient = value,
            (Param::MinGain, _) => self.min_gain = value,
            (Param::MinReturn, Policy::Single { min_return, .. }) => *min_return = value,
            (Param::StopLoss, Policy::Single { stop_loss, .. }) => *stop_loss = value,
            (Param::StateThreshold, Policy::Stacked { state_threshold }) => {
                *state_threshold = value
            }
            _ => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        assert_eq!(StrategyParams::single_default().policy.kind(), PolicyKind::Single);
        assert_eq!(StrategyParams::stacked_default().policy.kind(), PolicyKind::Stacked);
        assert_eq!(StrategyParams::single_default().lookback, 500);
    }

    #[test]
    fn value_reads_policy_specific_params() {
        let single = StrategyParams::single_default();
        assert_eq!(single.value(Param::StopLoss), Some(0.53));
        assert_eq!(single.value(Param::StateThreshold), None);

        let stacked = StrategyParams::stacked_default();
        assert_eq!(stacked.value(Param::StateThreshold), Some(-10.0));
        assert_eq!(stacked.value(Param::MinReturn), None);
    }

    #[test]
    fn with_value_replaces_and_ignores_foreign() {
        let p = StrategyParams::single_default()
            .with_value(Param::UpturnCoefficient, 0.3)
            .with_value(Param::MinReturn, 0.02)
            .with_value(Param::StateThreshold, 5.0);
        assert_eq!(p.upturn_coefficient, 0.3);
        assert_eq!(p.value(Param::MinReturn), Some(0.02));
        assert_eq!(p.value(Param::StateThreshold), None);
    }

    #[test]
    fn parse_policy_and_metric() {
        assert_eq!("Stacked".parse::<PolicyKind>(), Ok(PolicyKind::Stacked));
        assert_eq!("multiple".parse::<PolicyKind>(), Ok(PolicyKind::Stacked));
        assert!("both".parse::<PolicyKind>().is_err());
        assert_eq!("normalised".parse::<GainMetric>(), Ok(GainMetric::Normalized));
        assert_eq!(GainMetric::default(), GainMetric::Raw);
    }

    #[test]
    fn param_lists_cover_each_policy() {
        assert_eq!(Param::for_policy(PolicyKind::Single).len(), 5);
        assert!(Param::for_policy(PolicyKind::Stacked).contains(&Param::StateThreshold));
        assert_eq!(Param::MinGain.to_string(), "min_gain");
    }
}
