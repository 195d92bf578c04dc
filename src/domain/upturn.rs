//! Upturn detection: has the price recovered enough from its trough?

use super::correction::Observation;

/// Multiple of the trough the price must reach to count as an upturn.
///
/// `1 + (c * 100 * drawdown)^2 / 100`, where drawdown is `(peak - trough) / peak`.
/// Deeper corrections demand proportionally larger recoveries.
pub fn required_upturn(peak: f64, trough: f64, coefficient: f64) -> f64 {
    let depth = coefficient * 100.0 * (peak - trough) / peak;
    1.0 + depth * depth / 100.0
}

/// True when the instrument is, or was yesterday, in correction and the
/// price has recovered at least the required multiple of its trough.
pub fn is_upturning(observation: &Observation, coefficient: f64) -> bool {
    let Some(stats) = observation.stats else {
        return false;
    };
    if stats.trough <= 0.0 {
        return false;
    }
    if !(observation.in_correction || observation.was_in_correction()) {
        return false;
    }
    stats.price >= required_upturn(stats.peak, stats.trough, coefficient) * stats.trough
}
