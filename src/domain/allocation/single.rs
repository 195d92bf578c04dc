//! Single-position allocation.

use std::collections::HashSet;

use tracing::debug;

use crate::domain::order::OrderIntent;
use crate::domain::ranking::CandidateRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct HeldPosition {
    pub code: String,
    pub entry_price: f64,
    pub days_held: usize,
}

/// Run state carried by the single-position policy between days.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinglePositionState {
    pub held: Option<HeldPosition>,
}

/// Held instrument's prices as seen today.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldQuote {
    pub price: f64,
    /// Highest close over the last `days_held` days.
    pub peak_since_entry: f64,
}

pub struct SingleInputs<'a> {
    pub candidates: &'a [CandidateRecord],
    pub ranking: &'a [usize],
    pub any_upturning: bool,
    /// True when the portfolio holds any shares.
    pub holding: bool,
    pub held_quote: Option<HeldQuote>,
    pub portfolio_value: f64,
    pub open_orders: &'a HashSet<String>,
    pub min_return: f64,
    pub stop_loss: f64,
}

fn should_exit(held: &HeldPosition, quote: &HeldQuote, min_return: f64, stop_loss: f64) -> bool {
    quote.price / held.entry_price >= 1.0 + min_return
        || quote.price < stop_loss * quote.peak_since_entry
}

/// Decide today's orders. Emits at most one sell and one buy.
pub fn decide(state: &mut SinglePositionState, inputs: &SingleInputs<'_>) -> Vec<OrderIntent> {
    let mut intents = Vec::new();

    if inputs.holding && state.held.is_none() {
        debug!("holdings exist without a tracked entry, skipping");
        return intents;
    }

    if inputs.any_upturning && inputs.open_orders.is_empty() {
        for &i in inputs.ranking {
            let candidate = &inputs.candidates[i];

            if !inputs.holding {
                debug!(code = %candidate.code, price = candidate.price, "opening position");
                intents.push(OrderIntent::target(&candidate.code, 1.0));
                state.held = Some(HeldPosition {
                    code: candidate.code.clone(),
                    entry_price: candidate.price,
                    days_held: 1,
                });
                break;
            }
            let Some(held) = state.held.as_mut() else {
                break;
            };

            if candidate.code == held.code {
                held.days_held += 1;
                break;
            }

            let Some(quote) = inputs.held_quote else {
                continue;
            };
            if should_exit(held, &quote, inputs.min_return, inputs.stop_loss)
                && candidate.price < inputs.portfolio_value
                && !inputs.open_orders.contains(&candidate.code)
            {
                debug!(from = %held.code, to = %candidate.code, "switching position");
                intents.push(OrderIntent::target(&held.code, 0.0));
                intents.push(OrderIntent::target(&candidate.code, 1.0));
                *held = HeldPosition {
                    code: candidate.code.clone(),
                    entry_price: candidate.price,
                    days_held: 1,
                };
                break;
            }
        }
    } else if inputs.holding {
        if let Some(held) = state.held.as_mut() {
            held.days_held += 1;
            if let Some(quote) = inputs.held_quote {
                if quote.price < inputs.stop_loss * quote.peak_since_entry
                    && !inputs.open_orders.contains(&held.code)
                {
                    debug!(code = %held.code, price = quote.price, "stop loss");
                    intents.push(OrderIntent::target(&held.code, 0.0));
                }
            }
        }
    }

    intents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(code: &str, index: usize, price: f64) -> CandidateRecord {
        CandidateRecord {
            code: code.to_string(),
            index,
            price,
            peak: price * 1.2,
            trough: price * 0.8,
            potential_gain: 1.0,
            is_upturning: true,
            consider: true,
        }
    }

    fn inputs<'a>(
        candidates: &'a [CandidateRecord],
        ranking: &'a [usize],
        open_orders: &'a HashSet<String>,
    ) -> SingleInputs<'a> {
        SingleInputs {
            candidates,
            ranking,
            any_upturning: !ranking.is_empty(),
            holding: false,
            held_quote: None,
            portfolio_value: 100_000.0,
            open_orders,
            min_return: 0.26,
            stop_loss: 0.53,
        }
    }

    fn holding(code: &str, entry_price: f64, days_held: usize) -> SinglePositionState {
        SinglePositionState {
            held: Some(HeldPosition {
                code: code.to_string(),
                entry_price,
                days_held,
            }),
        }
    }

    #[test]
    fn opens_top_candidate() {
        let candidates = vec![candidate("^FTSE", 0, 95.0), candidate("^HSI", 1, 50.0)];
        let none = HashSet::new();
        let mut state = SinglePositionState::default();

        let intents = decide(&mut state, &inputs(&candidates, &[1, 0], &none));
        assert_eq!(intents, vec![OrderIntent::target("^HSI", 1.0)]);
        let held = state.held.unwrap();
        assert_eq!(held.code, "^HSI");
        assert_eq!(held.days_held, 1);
        assert!((held.entry_price - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn waits_while_orders_are_open() {
        let candidates = vec![candidate("^FTSE", 0, 95.0)];
        let open: HashSet<String> = ["^FTSE".to_string()].into();
        let mut state = SinglePositionState::default();
        assert!(decide(&mut state, &inputs(&candidates, &[0], &open)).is_empty());
        assert!(state.held.is_none());
    }

    #[test]
    fn holds_when_top_candidate_is_held() {
        let candidates = vec![candidate("^FTSE", 0, 95.0)];
        let none = HashSet::new();
        let mut state = holding("^FTSE", 90.0, 3);
        let mut input = inputs(&candidates, &[0], &none);
        input.holding = true;
        input.held_quote = Some(HeldQuote {
            price: 95.0,
            peak_since_entry: 96.0,
        });

        assert!(decide(&mut state, &input).is_empty());
        assert_eq!(state.held.unwrap().days_held, 4);
    }

    #[test]
    fn switches_after_min_return() {
        let candidates = vec![candidate("^GDAXI", 0, 40.0)];
        let none = HashSet::new();
        let mut state = holding("^FTSE", 100.0, 20);
        let mut input = inputs(&candidates, &[0], &none);
        input.holding = true;
        input.held_quote = Some(HeldQuote {
            price: 130.0,
            peak_since_entry: 131.0,
        });

        let intents = decide(&mut state, &input);
        assert_eq!(
            intents,
            vec![
                OrderIntent::target("^FTSE", 0.0),
                OrderIntent::target("^GDAXI", 1.0)
            ]
        );
        let held = state.held.unwrap();
        assert_eq!(held.code, "^GDAXI");
        assert_eq!(held.days_held, 1);
    }

    #[test]
    fn keeps_position_below_min_return() {
        let candidates = vec![candidate("^GDAXI", 0, 40.0), candidate("^FTSE", 1, 110.0)];
        let none = HashSet::new();
        let mut state = holding("^FTSE", 100.0, 5);
        let mut input = inputs(&candidates, &[0, 1], &none);
        input.holding = true;
        input.held_quote = Some(HeldQuote {
            price: 110.0,
            peak_since_entry: 112.0,
        });

        // first candidate is not decisive, scan continues to the held one
        assert!(decide(&mut state, &input).is_empty());
        assert_eq!(state.held.unwrap().days_held, 6);
    }

    #[test]
    fn skips_unaffordable_candidate() {
        let candidates = vec![candidate("^BVSP", 0, 200_000.0)];
        let none = HashSet::new();
        let mut state = holding("^FTSE", 100.0, 5);
        let mut input = inputs(&candidates, &[0], &none);
        input.holding = true;
        input.held_quote = Some(HeldQuote {
            price: 150.0,
            peak_since_entry: 150.0,
        });
        assert!(decide(&mut state, &input).is_empty());
        assert_eq!(state.held.unwrap().days_held, 5);
    }

    #[test]
    fn stop_loss_without_upturn() {
        let none = HashSet::new();
        let mut state = holding("^FTSE", 100.0, 30);
        let mut input = inputs(&[], &[], &none);
        input.holding = true;
        input.held_quote = Some(HeldQuote {
            price: 50.0,
            peak_since_entry: 100.0,
        });

        let intents = decide(&mut state, &input);
        assert_eq!(intents, vec![OrderIntent::target("^FTSE", 0.0)]);
        assert_eq!(state.held.unwrap().days_held, 31);
    }

    #[test]
    fn no_candidates_no_position_is_noop() {
        let none = HashSet::new();
        let mut state = SinglePositionState::default();
        assert!(decide(&mut state, &inputs(&[], &[], &none)).is_empty());
        assert!(state.held.is_none());
    }

    #[test]
    fn flat_after_stop_out_reopens() {
        let candidates = vec![candidate("^N225", 0, 20.0)];
        let none = HashSet::new();
        // entry still remembered, but the sell has filled
        let mut state = holding("^FTSE", 100.0, 40);
        let intents = decide(&mut state, &inputs(&candidates, &[0], &none));
        assert_eq!(intents, vec![OrderIntent::target("^N225", 1.0)]);
        assert_eq!(state.held.unwrap().code, "^N225");
    }
}
