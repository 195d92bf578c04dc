//! Candidate ranking by potential gain.

use super::strategy::GainMetric;

/// One instrument's state on the day, as seen by ranking and allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub code: String,
    /// Position of the instrument in the configured universe.
    pub index: usize,
    pub price: f64,
    pub peak: f64,
    pub trough: f64,
    pub potential_gain: f64,
    pub is_upturning: bool,
    pub consider: bool,
}

pub fn potential_gain(peak: f64, price: f64, metric: GainMetric) -> f64 {
    match metric {
        // Operator precedence reproduced on purpose: this is `peak - 1`.
        GainMetric::Raw => peak - price / price,
        GainMetric::Normalized => (peak - price) / price,
    }
}

pub fn is_eligible(candidate: &CandidateRecord, require_consider: bool) -> bool {
    candidate.is_upturning
        && candidate.potential_gain > 0.0
        && (!require_consider || candidate.consider)
}

/// Positions in `candidates` of the eligible records, best gain first.
///
/// Equal gains keep their input order.
pub fn rank(candidates: &[CandidateRecord], require_consider: bool) -> Vec<usize> {
    let mut ranked: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| is_eligible(c, require_consider))
        .map(|(i, _)| i)
        .collect();
    ranked.sort_by(|&a, &b| {
        candidates[b]
            .potential_gain
            .total_cmp(&candidates[a].potential_gain)
    });
    ranked
}
