//! Backtest engine and daily event loop.
//!
//! The engine owns the portfolio and the pending order book. Each trading
//! day it fills pending orders at the close, lets the strategy decide
//! against a [`MarketPort`] view, turns the intents into share orders and
//! records equity.

use std::collections::{HashMap, HashSet};

use chrono::{Days, NaiveDate};
use tracing::debug;

use super::code_data::CodeData;
use super::decision::CorrectionStrategy;
use super::error::CorrexError;
use super::execution::{self, BuyResult, ExecutionConfig};
use super::metrics::Metrics;
use super::order::OrderIntent;
use super::portfolio::Portfolio;
use super::strategy::StrategyParams;
use crate::ports::market_port::MarketPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    pub risk_free_rate: f64,
}

impl BacktestConfig {
    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            commission_per_trade: self.commission_per_trade,
            commission_pct: self.commission_pct,
            slippage_pct: self.slippage_pct,
        }
    }

    /// First calendar day of data needed so `lookback` bars exist at `start_date`.
    pub fn warmup_start(&self, lookback: usize) -> NaiveDate {
        warmup_start(self.start_date, lookback)
    }
}

/// `start - ceil(lookback * 7 / 5) - 30` calendar days.
pub fn warmup_start(start: NaiveDate, lookback: usize) -> NaiveDate {
    let days = (lookback * 7).div_ceil(5) as u64 + 30;
    start.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub cash: f64,
    pub daily_return: f64,
    pub benchmark_return: f64,
    pub buys: usize,
    pub sells: usize,
    pub positions: usize,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub portfolio: Portfolio,
    pub daily: Vec<DailyRecord>,
    /// Empty when the run had no benchmark.
    pub benchmark_returns: Vec<f64>,
}

impl BacktestResult {
    pub fn metrics(&self, risk_free_rate: f64) -> Metrics {
        Metrics::compute(&self.portfolio, risk_free_rate, &self.benchmark_returns)
    }

    pub fn returns(&self) -> Vec<f64> {
        self.daily.iter().map(|d| d.daily_return).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PendingOrder {
    code: String,
    quantity: i64,
}

impl PendingOrder {
    fn is_sell(&self) -> bool {
        self.quantity < 0
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FillCounts {
    buys: usize,
    sells: usize,
}

/// Market state for one run, exposed to the strategy through [`MarketPort`].
struct Simulation<'a> {
    code_data: &'a [CodeData],
    lookup: HashMap<&'a str, usize>,
    date: NaiveDate,
    portfolio: Portfolio,
    pending: Vec<PendingOrder>,
    last_prices: HashMap<String, f64>,
    execution: ExecutionConfig,
}

impl<'a> Simulation<'a> {
    fn new(code_data: &'a [CodeData], config: &BacktestConfig) -> Self {
        Simulation {
            code_data,
            lookup: code_data
                .iter()
                .enumerate()
                .map(|(i, cd)| (cd.code.as_str(), i))
                .collect(),
            date: config.start_date,
            portfolio: Portfolio::new(config.initial_capital),
            pending: Vec::new(),
            last_prices: HashMap::new(),
            execution: config.execution(),
        }
    }

    fn advance(&mut self, date: NaiveDate) {
        self.date = date;
        for cd in self.code_data {
            if let Some(price) = cd.last_close(date) {
                self.last_prices.insert(cd.code.clone(), price);
            }
        }
    }

    /// Fill every pending order whose instrument trades today, sells first.
    ///
    /// Buys stay pending while any sell is still waiting for a bar, so the
    /// cash a sell frees is there when its paired buy fills.
    fn fill_pending(&mut self) -> FillCounts {
        let mut counts = FillCounts::default();
        let (mut ready, mut waiting): (Vec<PendingOrder>, Vec<PendingOrder>) =
            std::mem::take(&mut self.pending)
                .into_iter()
                .partition(|order| self.bar_close(&order.code).is_some());
        if waiting.iter().any(PendingOrder::is_sell) {
            let (sells, buys): (Vec<PendingOrder>, Vec<PendingOrder>) =
                ready.into_iter().partition(PendingOrder::is_sell);
            ready = sells;
            waiting.extend(buys);
        }
        self.pending = waiting;
        ready.sort_by_key(|order| !order.is_sell());

        for order in ready {
            let Some(price) = self.bar_close(&order.code) else {
                continue;
            };
            if order.is_sell() {
                if let Some(fill) = execution::fill_sell(
                    &mut self.portfolio,
                    &order.code,
                    -order.quantity,
                    price,
                    self.date,
                    &self.execution,
                ) {
                    debug!(date = %self.date, code = %order.code, quantity = fill.quantity, price = fill.exit_price, "sell filled");
                    counts.sells += 1;
                }
            } else {
                match execution::fill_buy(
                    &mut self.portfolio,
                    &order.code,
                    order.quantity,
                    price,
                    self.date,
                    &self.execution,
                ) {
                    BuyResult::Filled {
                        quantity,
                        execution_price,
                        ..
                    } => {
                        debug!(date = %self.date, code = %order.code, quantity, price = execution_price, "buy filled");
                        counts.buys += 1;
                    }
                    BuyResult::InsufficientCapital => {
                        debug!(date = %self.date, code = %order.code, "buy cancelled, insufficient cash");
                    }
                }
            }
        }
        counts
    }

    fn bar_close(&self, code: &str) -> Option<f64> {
        let &i = self.lookup.get(code)?;
        self.code_data[i].get_bar(self.date).map(|bar| bar.close)
    }

    /// Convert intents to share orders at today's last price.
    fn submit(&mut self, intents: &[OrderIntent]) {
        let value = self.portfolio_value();
        for intent in intents {
            let code = intent.code();
            let Some(&price) = self.last_prices.get(code) else {
                debug!(date = %self.date, code, "no price for order, skipped");
                continue;
            };
            let held = self.portfolio.shares(code);
            let quantity = match intent {
                OrderIntent::Shares { quantity, .. } => *quantity,
                OrderIntent::TargetPercent { fraction, .. } => {
                    (fraction * value / price).floor() as i64 - held
                }
            };
            self.pending.retain(|order| order.code != code);
            if quantity != 0 {
                debug!(date = %self.date, code, quantity, "order submitted");
                self.pending.push(PendingOrder {
                    code: code.to_string(),
                    quantity,
                });
            }
        }
    }
}

impl MarketPort for Simulation<'_> {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn history(&self, code: &str, lookback: usize) -> &[f64] {
        match self.lookup.get(code) {
            Some(&i) => self.code_data[i].history(self.date, lookback),
            None => &[],
        }
    }

    fn portfolio_value(&self) -> f64 {
        self.portfolio.total_equity(&self.last_prices)
    }

    fn holdings(&self) -> HashMap<String, i64> {
        self.portfolio.holdings()
    }

    fn open_orders(&self) -> HashSet<String> {
        self.pending.iter().map(|o| o.code.clone()).collect()
    }
}

fn benchmark_return(benchmark: &CodeData, date: NaiveDate) -> f64 {
    if benchmark.get_bar(date).is_none() {
        return 0.0;
    }
    match benchmark.history(date, 2) {
        [prev, curr] if *prev > 0.0 => curr / prev - 1.0,
        _ => 0.0,
    }
}

/// Run one backtest over `timeline`.
///
/// `code_data` may hold bars before the first timeline day; they serve as
/// warm-up history only. Any error from the strategy aborts the run.
pub fn run_backtest(
    code_data: &[CodeData],
    timeline: &[NaiveDate],
    params: &StrategyParams,
    config: &BacktestConfig,
    benchmark: Option<&CodeData>,
) -> Result<BacktestResult, CorrexError> {
    let codes = code_data.iter().map(|cd| cd.code.clone()).collect();
    let mut strategy = CorrectionStrategy::new(codes, *params);
    let mut sim = Simulation::new(code_data, config);
    let mut daily = Vec::with_capacity(timeline.len());
    let mut benchmark_returns = Vec::new();
    let mut prev_value = config.initial_capital;

    for &date in timeline {
        sim.advance(date);
        let fills = sim.fill_pending();

        let decision = strategy.step(&sim)?;
        sim.submit(&decision.intents);

        let value = sim.portfolio_value();
        sim.portfolio.record_equity(date, value);

        let daily_return = if prev_value > 0.0 {
            value / prev_value - 1.0
        } else {
            0.0
        };
        prev_value = value;

        let bench = benchmark.map_or(0.0, |b| benchmark_return(b, date));
        if benchmark.is_some() {
            benchmark_returns.push(bench);
        }

        daily.push(DailyRecord {
            date,
            portfolio_value: value,
            cash: sim.portfolio.cash,
            daily_return,
            benchmark_return: bench,
            buys: fills.buys,
            sells: fills.sells,
            positions: sim.portfolio.position_count(),
        });
    }

    debug!(
        days = daily.len(),
        trades = sim.portfolio.closed_trades.len(),
        final_value = prev_value,
        "backtest finished"
    );

    Ok(BacktestResult {
        portfolio: sim.portfolio,
        daily,
        benchmark_returns,
    })
}
