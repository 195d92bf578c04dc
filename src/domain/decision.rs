//! Daily decision step.
//!
//! Each simulated day the strategy observes every instrument's trailing
//! window, updates its correction state, evaluates upturns, ranks the
//! eligible candidates and hands them to the configured allocation policy.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use super::allocation::single::{self, HeldPosition, HeldQuote, SingleInputs, SinglePositionState};
use super::allocation::stacked;
use super::correction::{self, InstrumentState};
use super::error::CorrexError;
use super::order::OrderIntent;
use super::ranking::{self, CandidateRecord};
use super::strategy::{Policy, StrategyParams};
use super::upturn;
use crate::ports::market_port::MarketPort;

/// Everything the strategy saw and decided on one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyDecision {
    pub candidates: Vec<CandidateRecord>,
    /// Positions in `candidates`, best first.
    pub ranking: Vec<usize>,
    pub intents: Vec<OrderIntent>,
}

/// Market-correction strategy with its run state.
#[derive(Debug, Clone)]
pub struct CorrectionStrategy {
    codes: Vec<String>,
    params: StrategyParams,
    states: Vec<InstrumentState>,
    single: SinglePositionState,
}

impl CorrectionStrategy {
    pub fn new(codes: Vec<String>, params: StrategyParams) -> Self {
        let states = vec![InstrumentState::default(); codes.len()];
        CorrectionStrategy {
            codes,
            params,
            states,
            single: SinglePositionState::default(),
        }
    }

    /// Per-instrument state, in `codes` order.
    pub fn states(&self) -> &[InstrumentState] {
        &self.states
    }

    pub fn held(&self) -> Option<&HeldPosition> {
        self.single.held.as_ref()
    }

    /// Run one day. Every instrument's state is updated before any order is decided.
    pub fn step(&mut self, market: &dyn MarketPort) -> Result<DailyDecision, CorrexError> {
        let date = market.date();
        let mut candidates = Vec::new();
        let mut any_upturning = false;

        for (index, code) in self.codes.iter().enumerate() {
            let window = market.history(code, self.params.lookback);
            let observation =
                correction::observe(&mut self.states[index], code, date, window, &self.params)?;
            let Some(stats) = observation.stats else {
                continue;
            };

            let is_upturning = upturn::is_upturning(&observation, self.params.upturn_coefficient);
            any_upturning |= is_upturning;

            candidates.push(CandidateRecord {
                code: code.clone(),
                index,
                price: stats.price,
                peak: stats.peak,
                trough: stats.trough,
                potential_gain: ranking::potential_gain(
                    stats.peak,
                    stats.price,
                    self.params.gain_metric,
                ),
                is_upturning,
                consider: observation.consider,
            });
        }

        let open_orders = market.open_orders();

        let (ranking, intents) = match self.params.policy {
            Policy::Single {
                min_return,
                stop_loss,
            } => {
                let ranking = ranking::rank(&candidates, false);
                let holding = market.holdings().values().sum::<i64>() > 0;
                let held_quote = match (&self.single.held, holding) {
                    (Some(held), true) => quote_held(market, held, date)?,
                    _ => None,
                };
                let inputs = SingleInputs {
                    candidates: &candidates,
                    ranking: &ranking,
                    any_upturning,
                    holding,
                    held_quote,
                    portfolio_value: market.portfolio_value(),
                    open_orders: &open_orders,
                    min_return,
                    stop_loss,
                };
                let intents = single::decide(&mut self.single, &inputs);
                (ranking, intents)
            }
            Policy::Stacked { .. } if any_upturning && open_orders.is_empty() => {
                let ranking = ranking::rank(&candidates, true);
                let prices: Vec<f64> = ranking.iter().map(|&i| candidates[i].price).collect();
                let shares = stacked::stack_shares(&prices, market.portfolio_value());
                let targets: HashMap<String, i64> = ranking
                    .iter()
                    .zip(shares)
                    .filter(|(_, count)| *count > 0)
                    .map(|(&i, count)| (candidates[i].code.clone(), count))
                    .collect();
                let intents = stacked::rebalance_orders(&self.codes, &targets, &market.holdings());
                (ranking, intents)
            }
            Policy::Stacked { .. } => (Vec::new(), Vec::new()),
        };

        debug!(
            %date,
            candidates = candidates.len(),
            ranked = ranking.len(),
            intents = intents.len(),
            "decision"
        );

        Ok(DailyDecision {
            candidates,
            ranking,
            intents,
        })
    }
}

fn quote_held(
    market: &dyn MarketPort,
    held: &HeldPosition,
    date: NaiveDate,
) -> Result<Option<HeldQuote>, CorrexError> {
    let recent = market.history(&held.code, held.days_held.max(1));
    let Some(&price) = recent.last() else {
        return Ok(None);
    };
    correction::validate_window(&held.code, date, recent)?;
    let peak_since_entry = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(Some(HeldQuote {
        price,
        peak_since_entry,
    }))
}
