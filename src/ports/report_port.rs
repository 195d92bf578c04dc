//! Report generation port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::CorrexError;
use crate::domain::search::SearchOutcome;
use crate::domain::strategy::StrategyParams;
use std::path::Path;

pub trait ReportPort {
    /// Write the daily performance, trades and summary of one backtest.
    fn write_backtest(
        &self,
        result: &BacktestResult,
        params: &StrategyParams,
        risk_free_rate: f64,
        output_dir: &Path,
    ) -> Result<(), CorrexError>;

    /// Write every search record, plus copies ranked by each metric.
    fn write_search(&self, outcome: &SearchOutcome, output_dir: &Path)
    -> Result<(), CorrexError>;
}
