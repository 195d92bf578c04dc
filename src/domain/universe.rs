//! Instrument universe.
//!
//! Parses the code list from configuration and loads each code's history,
//! skipping codes that cannot be backtested.

use crate::domain::code_data::CodeData;
use crate::domain::error::CorrexError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

/// Fewest bars a code needs to take part in a run at all.
pub const MIN_OHLCV_BARS: usize = 30;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

/// Split a comma separated code list. Codes are case sensitive (`^GSPC`,
/// `BHP.AX`), so they are only trimmed.
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let code = token.trim();
        if code.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        if !seen.insert(code.to_string()) {
            return Err(UniverseError::DuplicateCode(code.to_string()));
        }
        codes.push(code.to_string());
    }

    Ok(codes)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    FetchFailed(String),
    InsufficientBars { bars: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug)]
pub struct Universe {
    /// Loaded histories, in configuration order.
    pub data: Vec<CodeData>,
    pub skipped: Vec<SkippedCode>,
}

impl Universe {
    pub fn codes(&self) -> Vec<String> {
        self.data.iter().map(|cd| cd.code.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }
}

/// Load every code over `[start_date, end_date]`.
///
/// Codes that fail to load or have fewer than [`MIN_OHLCV_BARS`] bars are
/// skipped with a warning. Fails with `InsufficientData` when nothing is left.
pub fn validate_universe(
    data_port: &dyn DataPort,
    codes: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Universe, CorrexError> {
    let mut data = Vec::new();
    let mut skipped = Vec::new();

    for code in codes {
        let reason = match data_port.fetch_bars(code, start_date, end_date) {
            Err(e) => SkipReason::FetchFailed(e.to_string()),
            Ok(bars) if bars.is_empty() => SkipReason::NoData,
            Ok(bars) if bars.len() < MIN_OHLCV_BARS => {
                SkipReason::InsufficientBars { bars: bars.len() }
            }
            Ok(bars) => {
                info!(code = %code, bars = bars.len(), "loaded");
                data.push(CodeData::new(code.clone(), bars));
                continue;
            }
        };
        warn!(code = %code, reason = ?reason, "skipping code");
        skipped.push(SkippedCode {
            code: code.clone(),
            reason,
        });
    }

    if data.is_empty() {
        return Err(CorrexError::InsufficientData {
            code: "all".to_string(),
            bars: 0,
            minimum: MIN_OHLCV_BARS,
        });
    }

    if !skipped.is_empty() {
        eprintln!(
            "Backtesting {} of {} codes",
            data.len(),
            data.len() + skipped.len()
        );
    }

    Ok(Universe { data, skipped })
}
