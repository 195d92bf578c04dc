//! Exhaustive grid search, optionally in parallel.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{info, warn};

use super::space::ParameterSpace;
use super::{SearchConfig, SearchContext, SearchControl, SearchOutcome, SearchRecord, random_timeframe};
use crate::domain::error::CorrexError;
use crate::domain::strategy::StrategyParams;

type Job = (StrategyParams, (NaiveDate, NaiveDate));

/// Every combination in the grid once, each with its own random timeframe
/// when those are enabled.
fn jobs(
    ctx: &SearchContext<'_>,
    space: &ParameterSpace,
    config: &SearchConfig,
) -> Result<Vec<Job>, CorrexError> {
    let combos = space.grid()?;
    let (start, end) = ctx.full_window();
    match config.random_years {
        None => Ok(combos.into_iter().map(|p| (p, (start, end))).collect()),
        Some(years) => {
            // windows are drawn up front so parallel runs stay reproducible
            let mut rng = StdRng::seed_from_u64(config.seed);
            combos
                .into_iter()
                .map(|p| random_timeframe(start, end, years, &mut rng).map(|window| (p, window)))
                .collect()
        }
    }
}

pub fn grid_search(
    ctx: &SearchContext<'_>,
    space: &ParameterSpace,
    config: &SearchConfig,
    control: SearchControl<'_>,
) -> Result<SearchOutcome, CorrexError> {
    let jobs = jobs(ctx, space, config)?;
    let total = jobs.len();
    let done = AtomicUsize::new(0);
    let stopped = AtomicBool::new(false);
    let started = Instant::now();

    info!(runs = total, parallel = config.parallel, "grid search started");

    let run = |(params, window): &Job| -> Option<Result<SearchRecord, CorrexError>> {
        if control.should_stop() {
            stopped.store(true, Ordering::Relaxed);
            return None;
        }
        let result = ctx.evaluate(params, *window);
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(record) = &result {
            info!(
                run = finished,
                runs = total,
                start = %record.start,
                end = %record.end,
                mean_daily_return = record.mean_daily_return,
                alpha = record.alpha,
                completion_pct = finished as f64 / total as f64 * 100.0,
                elapsed_s = started.elapsed().as_secs(),
                "run finished"
            );
        }
        Some(result)
    };

    let results: Vec<Option<Result<SearchRecord, CorrexError>>> = if config.parallel {
        jobs.par_iter().map(run).collect()
    } else {
        jobs.iter().map(run).collect()
    };

    let mut outcome = SearchOutcome {
        cancelled: stopped.load(Ordering::Relaxed),
        ..Default::default()
    };
    for result in results.into_iter().flatten() {
        match result {
            Ok(record) => outcome.records.push(record),
            Err(e) => {
                warn!(error = %e, "run failed");
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}
