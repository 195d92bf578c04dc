//! CSV file data adapter.
//!
//! One file per code, `<dir>/<code>.csv`, in the Yahoo Finance export layout:
//! `Date,Open,High,Low,Close,Adj Close,Volume`. Columns are located by header
//! name, case insensitively, so `Adj Close` and column order do not matter.

use crate::domain::error::CorrexError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Stand-in for missing, zero or negative volume.
pub const DEFAULT_VOLUME: i64 = 10_000_000;

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct ColumnIndex([usize; 6]);

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord, path: &str) -> Result<Self, CorrexError> {
        let mut index = [0; 6];
        for (slot, name) in index.iter_mut().zip(COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| CorrexError::Data {
                    reason: format!("{path}: missing {name} column"),
                })?;
        }
        Ok(ColumnIndex(index))
    }
}

fn is_null(field: &str) -> bool {
    let field = field.trim();
    field.is_empty() || field.eq_ignore_ascii_case("null") || field.eq_ignore_ascii_case("nan")
}

fn parse_price(field: &str, name: &str, line: u64) -> Result<f64, CorrexError> {
    field.trim().parse().map_err(|e| CorrexError::Data {
        reason: format!("line {line}: invalid {name} value '{field}': {e}"),
    })
}

/// Volume may be written as a float; non-positive or missing volume is replaced.
fn parse_volume(field: &str) -> i64 {
    match field.trim().parse::<f64>() {
        Ok(v) if v > 0.0 => v as i64,
        _ => DEFAULT_VOLUME,
    }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{code}.csv"))
    }

    /// Every usable bar in the file, oldest first.
    fn read_all(&self, code: &str) -> Result<Vec<OhlcvBar>, CorrexError> {
        let path = self.csv_path(code);
        let shown = path.display().to_string();
        let content = fs::read_to_string(&path).map_err(|e| CorrexError::Data {
            reason: format!("failed to read {shown}: {e}"),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let columns = ColumnIndex::from_headers(rdr.headers()?, &shown)?;
        let [date_col, open_col, high_col, low_col, close_col, volume_col] = columns.0;

        let mut bars = Vec::new();
        let mut skipped = 0usize;
        for result in rdr.records() {
            let record = result?;
            let line = record.position().map_or(0, |p| p.line());
            let field = |i: usize| record.get(i).unwrap_or("");

            let date = NaiveDate::parse_from_str(field(date_col).trim(), "%Y-%m-%d").map_err(
                |e| CorrexError::Data {
                    reason: format!("{shown} line {line}: invalid date: {e}"),
                },
            )?;

            let prices = [open_col, high_col, low_col, close_col].map(field);
            if prices.iter().any(|p| is_null(p)) {
                skipped += 1;
                continue;
            }

            bars.push(OhlcvBar {
                code: code.to_string(),
                date,
                open: parse_price(prices[0], "open", line)?,
                high: parse_price(prices[1], "high", line)?,
                low: parse_price(prices[2], "low", line)?,
                close: parse_price(prices[3], "close", line)?,
                volume: parse_volume(field(volume_col)),
            });
        }

        if skipped > 0 {
            debug!(code, skipped, "skipped rows with missing prices");
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, CorrexError> {
        let mut bars = self.read_all(code)?;
        bars.retain(|b| b.date >= start_date && b.date <= end_date);
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, CorrexError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| CorrexError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(code) = name.to_string_lossy().strip_suffix(".csv") {
                symbols.push(code.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, CorrexError> {
        let bars = self.read_all(code)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}
