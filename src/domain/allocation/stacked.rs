//! Stacked allocation: share-by-share distribution over ranked candidates.
//!
//! The walk visits candidates in rank order, cyclically, buying one share of
//! the current candidate whenever its price is below the remaining capital
//! and deducting the price rounded up. It stops once the remaining capital no
//! longer exceeds the cheapest ranked price.

use std::collections::HashMap;

use crate::domain::order::OrderIntent;

/// Shares per ranked position, in the same order as `ranked_prices`.
///
/// At the start of every cycle, candidates already priced at or above the
/// remaining capital can never be bought again. Whole cycles over the rest
/// are applied in bulk while every purchase in them is certain, which gives
/// the same result as the one-share walk.
pub fn stack_shares(ranked_prices: &[f64], capital: f64) -> Vec<i64> {
    let n = ranked_prices.len();
    let mut shares = vec![0i64; n];
    if n == 0 {
        return shares;
    }

    let cheapest = ranked_prices.iter().copied().fold(f64::INFINITY, f64::min);
    let mut remaining = capital;
    let mut i = 0;

    while remaining > cheapest {
        if i == 0 {
            remaining = apply_full_cycles(ranked_prices, remaining, &mut shares);
        }
        let price = ranked_prices[i];
        if price < remaining {
            shares[i] += 1;
            remaining -= price.ceil();
        }
        i = (i + 1) % n;
    }

    shares
}

fn apply_full_cycles(ranked_prices: &[f64], remaining: f64, shares: &mut [i64]) -> f64 {
    let affordable: Vec<bool> = ranked_prices.iter().map(|&p| p < remaining).collect();
    let cycle_cost: f64 = ranked_prices
        .iter()
        .zip(&affordable)
        .filter(|(_, ok)| **ok)
        .map(|(p, _)| p.ceil())
        .sum();
    if cycle_cost <= 0.0 {
        return remaining;
    }

    let cycles = (remaining / cycle_cost).floor() - 1.0;
    if cycles < 1.0 {
        return remaining;
    }

    let whole = cycles as i64;
    for (count, ok) in shares.iter_mut().zip(&affordable) {
        if *ok {
            *count += whole;
        }
    }
    remaining - cycles * cycle_cost
}

/// Share orders moving `holdings` to `targets`.
///
/// Every instrument in `codes` is visited; one missing from `targets` is
/// sold down to zero. Sells come first, each group in `codes` order.
pub fn rebalance_orders(
    codes: &[String],
    targets: &HashMap<String, i64>,
    holdings: &HashMap<String, i64>,
) -> Vec<OrderIntent> {
    let deltas: Vec<(&String, i64)> = codes
        .iter()
        .map(|code| {
            let target = targets.get(code).copied().unwrap_or(0);
            let held = holdings.get(code).copied().unwrap_or(0);
            (code, target - held)
        })
        .filter(|(_, delta)| *delta != 0)
        .collect();

    let sells = deltas.iter().filter(|(_, d)| *d < 0);
    let buys = deltas.iter().filter(|(_, d)| *d > 0);
    sells
        .chain(buys)
        .map(|(code, delta)| OrderIntent::shares(code, *delta))
        .collect()
}
