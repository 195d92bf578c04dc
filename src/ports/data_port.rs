//! Price history access port.

use crate::domain::error::CorrexError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `code` dated within `[start_date, end_date]`, oldest first.
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, CorrexError>;

    fn list_symbols(&self) -> Result<Vec<String>, CorrexError>;

    /// First date, last date and bar count, or `None` when there are no bars.
    fn get_data_range(&self, code: &str)
    -> Result<Option<(NaiveDate, NaiveDate, usize)>, CorrexError>;
}
