//! Search space over strategy parameters.

use crate::domain::error::CorrexError;
use crate::domain::strategy::{Param, Policy, StrategyParams};

#[derive(Debug, Clone, PartialEq)]
pub enum ParamSpec {
    Fixed(f64),
    /// Discrete values; the grid takes each one, the bandit their span.
    Values(Vec<f64>),
    /// Continuous interval, for the bandit only.
    Range { min: f64, max: f64 },
}

fn parse_number(s: &str) -> Result<f64, String> {
    let s = s.trim();
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("'{s}' is not a number"))
}

fn stepped(min: f64, max: f64, step: f64) -> Result<Vec<f64>, String> {
    if step <= 0.0 {
        return Err(format!("step must be positive, got {step}"));
    }
    if max < min {
        return Err(format!("range {min}..{max} is empty"));
    }
    let count = ((max - min) / step + 1e-9).floor() as usize + 1;
    Ok((0..count)
        .map(|i| {
            let v = min + i as f64 * step;
            (v * 1e10).round() / 1e10
        })
        .collect())
}

impl ParamSpec {
    /// Parse `0.1`, `0.1, 0.2`, `0.05..0.5 step 0.01` or `0.05..0.25`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if let Some((lo, rest)) = input.split_once("..") {
            let min = parse_number(lo)?;
            return match rest.split_once("step") {
                Some((hi, step)) => Ok(ParamSpec::Values(stepped(
                    min,
                    parse_number(hi)?,
                    parse_number(step)?,
                )?)),
                None => {
                    let max = parse_number(rest)?;
                    if max < min {
                        return Err(format!("range {min}..{max} is empty"));
                    }
                    Ok(ParamSpec::Range { min, max })
                }
            };
        }
        if input.contains(',') {
            let values = input
                .split(',')
                .map(parse_number)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(ParamSpec::Values(values));
        }
        parse_number(input).map(ParamSpec::Fixed)
    }

    /// Smallest and largest admissible value.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            ParamSpec::Fixed(v) => (*v, *v),
            ParamSpec::Values(values) => values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                }),
            ParamSpec::Range { min, max } => (*min, *max),
        }
    }
}

/// `min_gain` may not exceed `correction_margin`, nor `min_return` for a
/// single-position policy.
pub fn satisfies_constraints(params: &StrategyParams) -> bool {
    let within_margin = params.min_gain <= params.correction_margin;
    match params.policy {
        Policy::Single { min_return, .. } => within_margin && params.min_gain <= min_return,
        Policy::Stacked { .. } => within_margin,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    base: StrategyParams,
    specs: Vec<(Param, ParamSpec)>,
}

impl ParameterSpace {
    /// Every tunable parameter fixed at its value in `base`.
    pub fn new(base: StrategyParams) -> Self {
        let specs = Param::for_policy(base.policy.kind())
            .iter()
            .filter_map(|&p| base.value(p).map(|v| (p, ParamSpec::Fixed(v))))
            .collect();
        ParameterSpace { base, specs }
    }

    /// Replace the spec of `param`. Parameters foreign to the policy are ignored.
    pub fn with(mut self, param: Param, spec: ParamSpec) -> Self {
        if let Some(slot) = self.specs.iter_mut().find(|(p, _)| *p == param) {
            slot.1 = spec;
        }
        self
    }

    pub fn base(&self) -> &StrategyParams {
        &self.base
    }

    pub fn specs(&self) -> &[(Param, ParamSpec)] {
        &self.specs
    }

    pub fn spec(&self, param: Param) -> Option<&ParamSpec> {
        self.specs.iter().find(|(p, _)| *p == param).map(|(_, s)| s)
    }

    /// Cartesian product of every parameter's values.
    ///
    /// Combinations breaking [`satisfies_constraints`] are skipped.
    pub fn grid(&self) -> Result<Vec<StrategyParams>, CorrexError> {
        let mut combos = vec![self.base];
        for (param, spec) in &self.specs {
            let values: Vec<f64> = match spec {
                ParamSpec::Fixed(v) => vec![*v],
                ParamSpec::Values(values) => values.clone(),
                ParamSpec::Range { min, max } => {
                    return Err(CorrexError::ConfigInvalid {
                        section: "search".into(),
                        key: param.to_string(),
                        reason: format!("range {min}..{max} needs a step for grid search"),
                    });
                }
            };
            combos = combos
                .iter()
                .flat_map(|c| values.iter().map(move |&v| c.with_value(*param, v)))
                .collect();
        }
        combos.retain(satisfies_constraints);
        Ok(combos)
    }
}
