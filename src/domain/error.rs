//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for correx.
#[derive(Debug, thiserror::Error)]
pub enum CorrexError {
    #[error("data source error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {code}")]
    NoData { code: String },

    #[error("insufficient data for {code}: have {bars} bars, need {minimum}")]
    InsufficientData {
        code: String,
        bars: usize,
        minimum: usize,
    },

    /// A price the decision engine must divide by is zero, negative or not finite.
    #[error("invalid price for {code} on {date}: {value} ({context})")]
    InvalidPrice {
        code: String,
        date: NaiveDate,
        value: f64,
        context: String,
    },

    #[error("parameter search failed: {reason}")]
    Search { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&CorrexError> for std::process::ExitCode {
    fn from(err: &CorrexError) -> Self {
        let code: u8 = match err {
            CorrexError::Io(_) | CorrexError::Csv(_) => 1,
            CorrexError::ConfigParse { .. }
            | CorrexError::ConfigMissing { .. }
            | CorrexError::ConfigInvalid { .. } => 2,
            CorrexError::Data { .. } => 3,
            CorrexError::InvalidPrice { .. } => 4,
            CorrexError::NoData { .. } | CorrexError::InsufficientData { .. } => 5,
            CorrexError::Search { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
