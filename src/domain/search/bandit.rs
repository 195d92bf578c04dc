//! Multi-armed bandit search.
//!
//! Each episode every free parameter independently explores (uniform over
//! its span) or exploits (a small perturbation of the best value seen so
//! far). Exploration fades out towards the end of the schedule.

use std::time::Instant;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use super::space::{ParamSpec, ParameterSpace, satisfies_constraints};
use super::{
    ExploitMetric, SearchConfig, SearchContext, SearchControl, SearchOutcome, SearchRecord,
    best_record, random_timeframe,
};
use crate::domain::error::CorrexError;
use crate::domain::strategy::{Param, Policy, StrategyParams};

/// Fraction of a parameter's span an exploit step may move.
pub const EXPLOIT_SPREAD: f64 = 0.025;

/// Attempts at drawing a constraint-satisfying set before clamping.
pub const MAX_RESAMPLES: usize = 100;

/// `1 - exp(20 * (episode / episodes - 1))`: near 1 early, 0 at the end.
pub fn exploration_probability(episode: usize, episodes: usize) -> f64 {
    if episodes == 0 {
        return 0.0;
    }
    let p = 1.0 - (20.0 * (episode as f64 / episodes as f64 - 1.0)).exp();
    p.clamp(0.0, 1.0)
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn sample_value<R: Rng>(
    param: Param,
    spec: &ParamSpec,
    best: Option<&SearchRecord>,
    exploration: f64,
    rng: &mut R,
) -> f64 {
    let (lo, hi) = spec.bounds();
    if let ParamSpec::Fixed(v) = spec {
        return *v;
    }

    let best_value = best.and_then(|b| b.params.value(param));
    let explore = best_value.is_none() || rng.gen_bool(exploration);

    let value = match (explore, best_value) {
        (false, Some(b)) => {
            let spread = (hi - lo) * EXPLOIT_SPREAD;
            if spread > 0.0 {
                rng.gen_range(b - spread..=b + spread).clamp(lo, hi)
            } else {
                b
            }
        }
        _ => match spec {
            ParamSpec::Values(values) => values.choose(rng).copied().unwrap_or(lo),
            _ if hi > lo => rng.gen_range(lo..=hi),
            _ => lo,
        },
    };
    round4(value)
}

/// Pull `min_gain` down until the set satisfies the constraints.
fn clamp_min_gain(params: StrategyParams) -> StrategyParams {
    let mut cap = params.correction_margin;
    if let Policy::Single { min_return, .. } = params.policy {
        cap = cap.min(min_return);
    }
    StrategyParams {
        min_gain: params.min_gain.min(cap),
        ..params
    }
}

/// Draw the next parameter set from the history so far.
pub fn propose<R: Rng>(
    space: &ParameterSpace,
    history: &[SearchRecord],
    exploration: f64,
    metric: ExploitMetric,
    rng: &mut R,
) -> StrategyParams {
    let best = best_record(history, metric);
    let mut candidate = *space.base();
    for _ in 0..MAX_RESAMPLES {
        candidate = space.specs().iter().fold(*space.base(), |params, (param, spec)| {
            params.with_value(*param, sample_value(*param, spec, best, exploration, rng))
        });
        if satisfies_constraints(&candidate) {
            return candidate;
        }
    }
    clamp_min_gain(candidate)
}

/// Run `config.episodes` sequential episodes.
///
/// Failed runs are logged and counted. The search stops early when `control`
/// says so, keeping the records gathered so far.
pub fn bandit_search(
    ctx: &SearchContext<'_>,
    space: &ParameterSpace,
    config: &SearchConfig,
    control: SearchControl<'_>,
) -> Result<SearchOutcome, CorrexError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut outcome = SearchOutcome::default();
    let started = Instant::now();
    let (start, end) = ctx.full_window();

    for episode in 0..config.episodes {
        if control.should_stop() {
            outcome.cancelled = true;
            break;
        }

        let window = match config.random_years {
            Some(years) => random_timeframe(start, end, years, &mut rng)?,
            None => (start, end),
        };
        let exploration = exploration_probability(episode, config.episodes);
        let params = propose(
            space,
            &outcome.records,
            exploration,
            config.exploit_metric,
            &mut rng,
        );

        match ctx.evaluate(&params, window) {
            Ok(record) => {
                info!(
                    episode = episode + 1,
                    episodes = config.episodes,
                    start = %record.start,
                    end = %record.end,
                    mean_daily_return = record.mean_daily_return,
                    alpha = record.alpha,
                    completion_pct = (episode + 1) as f64 / config.episodes as f64 * 100.0,
                    elapsed_s = started.elapsed().as_secs(),
                    "episode finished"
                );
                outcome.records.push(record);
            }
            Err(e) => {
                warn!(episode = episode + 1, error = %e, "episode failed");
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}
