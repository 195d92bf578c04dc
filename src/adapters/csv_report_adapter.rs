//! CSV report adapter implementing ReportPort.
//!
//! A backtest writes `performance.csv` (one row per trading day with the
//! rolling analytics), `trades.csv`, `quarters.csv` and `summary.csv`.
//! A search writes `results.csv` in run order plus `ranked_by_return.csv`
//! and `ranked_by_alpha.csv`.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::domain::analysis::{
    MA_WINDOWS, SHARPE_WINDOW, STD_WINDOWS, moving_average, quarterly_candles, rolling_sharpe,
    rolling_sortino, rolling_std,
};
use crate::domain::backtest::BacktestResult;
use crate::domain::error::CorrexError;
use crate::domain::metrics::{Metrics, TRADING_DAYS_PER_YEAR};
use crate::domain::search::{ExploitMetric, SearchOutcome, SearchRecord};
use crate::domain::strategy::{Param, StrategyParams};
use crate::ports::report_port::ReportPort;

#[derive(Debug, Serialize)]
struct PerformanceRow {
    date: NaiveDate,
    portfolio_value: f64,
    cash: f64,
    daily_return: f64,
    benchmark_return: f64,
    buys: usize,
    sells: usize,
    positions: usize,
    rolling_sharpe_90: Option<f64>,
    rolling_sortino_90: Option<f64>,
    std_90: Option<f64>,
    std_180: Option<f64>,
    std_365: Option<f64>,
    ma_180: Option<f64>,
    ma_365: Option<f64>,
}

#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    code: &'a str,
    quantity: i64,
    entry_date: NaiveDate,
    entry_price: f64,
    exit_date: NaiveDate,
    exit_price: f64,
    pnl: f64,
}

#[derive(Debug, Serialize)]
struct QuarterRow {
    quarter: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

fn performance_rows(result: &BacktestResult, risk_free_rate: f64) -> Vec<PerformanceRow> {
    let returns = result.returns();
    let values: Vec<f64> = result.daily.iter().map(|d| d.portfolio_value).collect();
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;

    let sharpe = rolling_sharpe(&returns, SHARPE_WINDOW, daily_rf);
    let sortino = rolling_sortino(&returns, SHARPE_WINDOW, 0.0);
    let stds = STD_WINDOWS.map(|w| rolling_std(&returns, w));
    let mas = MA_WINDOWS.map(|w| moving_average(&values, w));

    result
        .daily
        .iter()
        .enumerate()
        .map(|(i, d)| PerformanceRow {
            date: d.date,
            portfolio_value: d.portfolio_value,
            cash: d.cash,
            daily_return: d.daily_return,
            benchmark_return: d.benchmark_return,
            buys: d.buys,
            sells: d.sells,
            positions: d.positions,
            rolling_sharpe_90: sharpe[i],
            rolling_sortino_90: sortino[i],
            std_90: stds[0][i],
            std_180: stds[1][i],
            std_365: stds[2][i],
            ma_180: mas[0][i],
            ma_365: mas[1][i],
        })
        .collect()
}

fn summary_rows(metrics: &Metrics, params: &StrategyParams) -> Vec<(String, String)> {
    let mut rows: Vec<(String, String)> = vec![
        ("policy".into(), params.policy.kind().to_string()),
        ("gain_metric".into(), params.gain_metric.to_string()),
        ("lookback".into(), params.lookback.to_string()),
        ("consider_window".into(), params.consider_window.to_string()),
    ];
    for param in Param::for_policy(params.policy.kind()) {
        if let Some(v) = params.value(*param) {
            rows.push((param.as_str().into(), v.to_string()));
        }
    }
    let values = [
        ("total_return", metrics.total_return),
        ("annualized_return", metrics.annualized_return),
        ("mean_daily_return", metrics.mean_daily_return),
        ("alpha", metrics.alpha),
        ("beta", metrics.beta),
        ("sharpe_ratio", metrics.sharpe_ratio),
        ("sortino_ratio", metrics.sortino_ratio),
        ("max_drawdown", metrics.max_drawdown),
        ("max_drawdown_duration", metrics.max_drawdown_duration as f64),
        ("trades_won", metrics.trades_won as f64),
        ("trades_lost", metrics.trades_lost as f64),
        ("trades_breakeven", metrics.trades_breakeven as f64),
        ("win_rate", metrics.win_rate),
        ("profit_factor", metrics.profit_factor),
        ("avg_win", metrics.avg_win),
        ("avg_loss", metrics.avg_loss),
        ("largest_win", metrics.largest_win),
        ("largest_loss", metrics.largest_loss),
        ("avg_trade_duration", metrics.avg_trade_duration),
    ];
    rows.extend(values.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    rows
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), CorrexError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_records(path: &Path, records: &[&SearchRecord]) -> Result<(), CorrexError> {
    let params = records
        .first()
        .map(|r| Param::for_policy(r.params.policy.kind()))
        .unwrap_or(&[]);

    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec!["mean_daily_return", "alpha", "start", "end"];
    header.extend(params.iter().map(|p| p.as_str()));
    wtr.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.mean_daily_return.to_string(),
            record.alpha.to_string(),
            record.start.to_string(),
            record.end.to_string(),
        ];
        row.extend(
            params
                .iter()
                .map(|p| record.params.value(*p).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        CsvReportAdapter
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_backtest(
        &self,
        result: &BacktestResult,
        params: &StrategyParams,
        risk_free_rate: f64,
        output_dir: &Path,
    ) -> Result<(), CorrexError> {
        fs::create_dir_all(output_dir)?;

        write_rows(
            &output_dir.join("performance.csv"),
            performance_rows(result, risk_free_rate),
        )?;

        write_rows(
            &output_dir.join("trades.csv"),
            result.portfolio.closed_trades.iter().map(|t| TradeRow {
                code: &t.code,
                quantity: t.quantity,
                entry_date: t.entry_date,
                entry_price: t.entry_price,
                exit_date: t.exit_date,
                exit_price: t.exit_price,
                pnl: t.pnl,
            }),
        )?;

        let series: Vec<(NaiveDate, f64)> = result
            .daily
            .iter()
            .map(|d| (d.date, d.portfolio_value))
            .collect();
        write_rows(
            &output_dir.join("quarters.csv"),
            quarterly_candles(&series).into_iter().map(|c| QuarterRow {
                quarter: c.quarter,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
            }),
        )?;

        let mut wtr = csv::Writer::from_path(output_dir.join("summary.csv"))?;
        wtr.write_record(["metric", "value"])?;
        for (key, value) in summary_rows(&result.metrics(risk_free_rate), params) {
            wtr.write_record([key, value])?;
        }
        wtr.flush()?;

        info!(dir = %output_dir.display(), days = result.daily.len(), "backtest report written");
        Ok(())
    }

    fn write_search(&self, outcome: &SearchOutcome, output_dir: &Path) -> Result<(), CorrexError> {
        fs::create_dir_all(output_dir)?;
        let in_order: Vec<&SearchRecord> = outcome.records.iter().collect();
        write_records(&output_dir.join("results.csv"), &in_order)?;
        write_records(
            &output_dir.join("ranked_by_return.csv"),
            &outcome.ranked_by(ExploitMetric::Return),
        )?;
        write_records(
            &output_dir.join("ranked_by_alpha.csv"),
            &outcome.ranked_by(ExploitMetric::Alpha),
        )?;
        info!(dir = %output_dir.display(), records = outcome.records.len(), "search results written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::DailyRecord;
    use crate::domain::portfolio::Portfolio;
    use crate::domain::position::ClosedTrade;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_result() -> BacktestResult {
        let mut portfolio = Portfolio::new(1000.0);
        let mut daily = Vec::new();
        for i in 0..120u64 {
            let date = d(2020, 1, 1) + chrono::Days::new(i);
            let value = 1000.0 + i as f64;
            portfolio.record_equity(date, value);
            daily.push(DailyRecord {
                date,
                portfolio_value: value,
                cash: value,
                daily_return: 0.001,
                benchmark_return: 0.0,
                buys: 0,
                sells: 0,
                positions: 0,
            });
        }
        portfolio.record_trade(ClosedTrade {
            code: "^GSPC".into(),
            quantity: 10,
            entry_price: 100.0,
            exit_price: 110.0,
            entry_date: d(2020, 1, 2),
            exit_date: d(2020, 2, 2),
            pnl: 100.0,
        });
        BacktestResult {
            portfolio,
            daily,
            benchmark_returns: Vec::new(),
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn backtest_report_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("run");
        CsvReportAdapter::new()
            .write_backtest(&sample_result(), &StrategyParams::single_default(), 0.0, &out)
            .unwrap();

        let perf = read(&out.join("performance.csv"));
        let mut lines = perf.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("date,portfolio_value,cash,daily_return"));
        assert!(header.ends_with("ma_180,ma_365"));
        assert_eq!(perf.lines().count(), 121);
        // no full 90 day window on the first day
        assert!(lines.next().unwrap().ends_with(",,,,,,"));

        let trades = read(&out.join("trades.csv"));
        assert!(trades.contains("^GSPC,10,2020-01-02,100.0,2020-02-02,110.0,100.0"));

        let quarters = read(&out.join("quarters.csv"));
        assert!(quarters.contains("2020-01-01,1000.0"));
        assert!(quarters.contains("2020-04-01"));

        let summary = read(&out.join("summary.csv"));
        assert!(summary.contains("policy,single"));
        assert!(summary.contains("stop_loss,"));
        assert!(summary.contains("trades_won,1"));
    }

    #[test]
    fn search_report_ranks_each_metric() {
        let dir = TempDir::new().unwrap();
        let record = |ret: f64, alpha: f64| SearchRecord {
            mean_daily_return: ret,
            alpha,
            params: StrategyParams::stacked_default(),
            start: d(1990, 1, 1),
            end: d(1995, 1, 1),
        };
        let outcome = SearchOutcome {
            records: vec![record(0.001, 0.5), record(0.003, 0.1)],
            ..Default::default()
        };
        CsvReportAdapter::new()
            .write_search(&outcome, dir.path())
            .unwrap();

        let results = read(&dir.path().join("results.csv"));
        let header = results.lines().next().unwrap();
        assert_eq!(
            header,
            "mean_daily_return,alpha,start,end,correction_margin,upturn_coefficient,min_gain,state_threshold"
        );

        let by_return = read(&dir.path().join("ranked_by_return.csv"));
        assert!(by_return.lines().nth(1).unwrap().starts_with("0.003,"));
        let by_alpha = read(&dir.path().join("ranked_by_alpha.csv"));
        assert!(by_alpha.lines().nth(1).unwrap().starts_with("0.001,0.5"));
    }
}
