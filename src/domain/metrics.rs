//! Performance metrics and statistics.

use super::portfolio::{EquityPoint, Portfolio};
use super::position::ClosedTrade;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub mean_daily_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub beta: f64,
    /// Annualized Jensen alpha against the benchmark, risk-free rate zero.
    pub alpha: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_trade_duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TradeStats {
    won: usize,
    lost: usize,
    breakeven: usize,
    total_wins: f64,
    total_losses: f64,
    largest_win: f64,
    largest_loss: f64,
    total_duration_days: i64,
}

impl TradeStats {
    fn collect(trades: &[ClosedTrade]) -> Self {
        let mut stats = TradeStats::default();
        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                stats.won += 1;
                stats.total_wins += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
            } else if pnl < 0.0 {
                stats.lost += 1;
                stats.total_losses += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
            } else {
                stats.breakeven += 1;
            }
            stats.total_duration_days += (trade.exit_date - trade.entry_date).num_days();
        }
        stats
    }

    fn count(&self) -> usize {
        self.won + self.lost + self.breakeven
    }
}

fn ratio_or_zero(numerator: f64, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator / denominator as f64
    } else {
        0.0
    }
}

impl Metrics {
    /// `benchmark_returns` is matched day by day against the equity curve;
    /// pass an empty slice when there is no benchmark.
    pub fn compute(portfolio: &Portfolio, risk_free_rate: f64, benchmark_returns: &[f64]) -> Self {
        let equity_curve = &portfolio.equity_curve;
        let initial_capital = portfolio.initial_capital;

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = equity_curve.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let returns = daily_returns(initial_capital, equity_curve);
        let mean_daily_return = mean(&returns);

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&returns, daily_rf);

        let (beta, alpha) = compute_alpha_beta(&returns, benchmark_returns);

        let trades = TradeStats::collect(&portfolio.closed_trades);
        let total_trades = trades.count();

        let profit_factor = if trades.total_losses > 0.0 {
            trades.total_wins / trades.total_losses
        } else if trades.total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Metrics {
            total_return,
            annualized_return,
            mean_daily_return,
            sharpe_ratio,
            sortino_ratio,
            beta,
            alpha,
            max_drawdown,
            max_drawdown_duration,
            trades_won: trades.won,
            trades_lost: trades.lost,
            trades_breakeven: trades.breakeven,
            win_rate: ratio_or_zero(trades.won as f64, total_trades),
            profit_factor,
            avg_win: ratio_or_zero(trades.total_wins, trades.won),
            avg_loss: ratio_or_zero(trades.total_losses, trades.lost),
            largest_win: trades.largest_win,
            largest_loss: trades.largest_loss,
            avg_trade_duration: ratio_or_zero(trades.total_duration_days as f64, total_trades),
        }
    }
}

/// Simple returns per equity point; the first is measured against `initial_capital`.
pub fn daily_returns(initial_capital: f64, equity_curve: &[EquityPoint]) -> Vec<f64> {
    let mut prev = initial_capital;
    equity_curve
        .iter()
        .map(|point| {
            let r = if prev > 0.0 {
                (point.equity - prev) / prev
            } else {
                0.0
            };
            prev = point.equity;
            r
        })
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            max_dd = max_dd.max(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(returns: &[f64], daily_rf: f64) -> (f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean = mean(returns);

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}

/// Beta and annualized alpha of `returns` against `benchmark`.
///
/// Only the overlapping prefix is used. A flat or missing benchmark gives
/// beta 0, so alpha reduces to the annualized mean return.
pub fn compute_alpha_beta(returns: &[f64], benchmark: &[f64]) -> (f64, f64) {
    let n = returns.len().min(benchmark.len());
    let (r, b) = (&returns[..n], &benchmark[..n]);

    let beta = if n > 1 {
        let (mean_r, mean_b) = (mean(r), mean(b));
        let cov: f64 = r.iter().zip(b).map(|(x, y)| (x - mean_r) * (y - mean_b)).sum();
        let var: f64 = b.iter().map(|y| (y - mean_b).powi(2)).sum();
        if var > 0.0 { cov / var } else { 0.0 }
    } else {
        0.0
    };

    let excess: Vec<f64> = if n > 0 {
        r.iter().zip(b).map(|(x, y)| x - beta * y).collect()
    } else {
        returns.to_vec()
    };

    if excess.is_empty() {
        return (beta, 0.0);
    }
    let alpha = (1.0 + mean(&excess)).powf(TRADING_DAYS_PER_YEAR) - 1.0;
    (beta, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    fn make_portfolio(equity: Vec<f64>, trades: Vec<ClosedTrade>) -> Portfolio {
        let initial = equity.first().copied().unwrap_or(100_000.0);
        let mut portfolio = Portfolio::new(initial);
        for trade in trades {
            portfolio.record_trade(trade);
        }
        for point in make_equity_curve(&equity) {
            portfolio.record_equity(point.date, point.equity);
        }
        portfolio
    }

    fn make_trade(code: &str, pnl: f64, days: i64) -> ClosedTrade {
        let entry_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ClosedTrade {
            code: code.to_string(),
            quantity: 100,
            entry_price: 100.0,
            exit_price: 100.0 + pnl / 100.0,
            entry_date,
            exit_date: entry_date + chrono::Duration::days(days),
            pnl,
        }
    }

    #[test]
    fn metrics_empty_portfolio() {
        let portfolio = Portfolio::new(100_000.0);
        let metrics = Metrics::compute(&portfolio, 0.05, &[]);
        assert!((metrics.total_return - 0.0).abs() < f64::EPSILON);
        assert!((metrics.mean_daily_return - 0.0).abs() < f64::EPSILON);
        assert!((metrics.alpha - 0.0).abs() < f64::EPSILON);
        assert_eq!(metrics.trades_won, 0);
    }

    #[test]
    fn metrics_total_return() {
        let up = Metrics::compute(&make_portfolio(vec![100_000.0, 110_000.0], vec![]), 0.05, &[]);
        assert!((up.total_return - 0.10).abs() < 1e-9);
        let down = Metrics::compute(&make_portfolio(vec![100_000.0, 90_000.0], vec![]), 0.05, &[]);
        assert!((down.total_return - (-0.10)).abs() < 1e-9);
    }

    #[test]
    fn metrics_annualized_return_flat() {
        let portfolio = make_portfolio(vec![100_000.0; 252], vec![]);
        let metrics = Metrics::compute(&portfolio, 0.05, &[]);
        assert!((metrics.annualized_return - 0.0).abs() < 1e-9);
    }

    #[test]
    fn daily_returns_start_from_initial_capital() {
        let curve = make_equity_curve(&[110.0, 121.0]);
        let returns = daily_returns(100.0, &curve);
        assert_relative_eq!(returns[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(returns[1], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn mean_daily_return_averages_all_days() {
        let mut portfolio = make_portfolio(vec![110.0, 99.0], vec![]);
        portfolio.initial_capital = 100.0;
        let metrics = Metrics::compute(&portfolio, 0.0, &[]);
        // (0.1 + -0.1) / 2
        assert_relative_eq!(metrics.mean_daily_return, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn beta_of_benchmark_against_itself_is_one() {
        let b = [0.01, -0.02, 0.015, 0.003, -0.007];
        let (beta, alpha) = compute_alpha_beta(&b, &b);
        assert_relative_eq!(beta, 1.0, epsilon = 1e-12);
        assert_relative_eq!(alpha, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn alpha_of_constant_outperformance() {
        let b = [0.01, -0.02, 0.015, 0.003, -0.007];
        let r: Vec<f64> = b.iter().map(|x| x + 0.001).collect();
        let (beta, alpha) = compute_alpha_beta(&r, &b);
        assert_relative_eq!(beta, 1.0, epsilon = 1e-9);
        assert_relative_eq!(alpha, 1.001f64.powf(252.0) - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn alpha_without_benchmark_is_annualized_mean() {
        let r = [0.001, 0.003];
        let (beta, alpha) = compute_alpha_beta(&r, &[]);
        assert_eq!(beta, 0.0);
        assert_relative_eq!(alpha, 1.002f64.powf(252.0) - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn metrics_trade_stats_wins_and_losses() {
        let trades = vec![
            make_trade("A", 100.0, 5),
            make_trade("B", -50.0, 3),
            make_trade("C", 200.0, 10),
            make_trade("D", 0.0, 1),
        ];
        let portfolio = make_portfolio(vec![100_000.0, 100_250.0], trades);
        let metrics = Metrics::compute(&portfolio, 0.05, &[]);

        assert_eq!(metrics.trades_won, 2);
        assert_eq!(metrics.trades_lost, 1);
        assert_eq!(metrics.trades_breakeven, 1);
        assert!((metrics.win_rate - 0.5).abs() < f64::EPSILON);
        assert!((metrics.profit_factor - 6.0).abs() < 1e-9);
        assert!((metrics.avg_win - 150.0).abs() < 1e-9);
        assert!((metrics.avg_loss - 50.0).abs() < 1e-9);
        assert!((metrics.largest_win - 200.0).abs() < 1e-9);
        assert!((metrics.largest_loss - 50.0).abs() < 1e-9);
        assert!((metrics.avg_trade_duration - 19.0 / 4.0).abs() < 1e-9);
    }

    #[test]
    fn metrics_max_drawdown_and_duration() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let (dd, _) = compute_drawdown(&curve);
        assert!((dd - (110.0 - 80.0) / 110.0).abs() < 1e-9);

        let curve = make_equity_curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0]);
        let (_, duration) = compute_drawdown(&curve);
        assert_eq!(duration, 4);
    }

    #[test]
    fn metrics_sharpe_ratio_positive() {
        let values: Vec<f64> = (0..253)
            .map(|i| 100_000.0 * (1.0 + 0.001 * i as f64))
            .collect();
        let metrics = Metrics::compute(&make_portfolio(values, vec![]), 0.0, &[]);
        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[test]
    fn metrics_sortino_ratio_finite() {
        let returns = [0.01, -0.005, 0.0099, -0.0148, 0.02];
        let (sharpe, sortino) = compute_risk_adjusted(&returns, 0.0);
        assert!(sharpe.is_finite());
        assert!(sortino.is_finite());
        assert!(sortino != 0.0);
    }
}
