//! Order fill simulation.
//!
//! Orders fill at the close of the first bar after submission, adjusted for
//! slippage, with a flat plus percentage commission per fill.

use chrono::NaiveDate;

use super::portfolio::Portfolio;
use super::position::ClosedTrade;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Buy: execution_price = market_price * (1 + slippage_pct / 100)
pub fn apply_slippage_buy(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Sell: execution_price = market_price * (1 - slippage_pct / 100)
pub fn apply_slippage_sell(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// Largest whole quantity whose cost plus commission fits in `cash`.
pub fn affordable_quantity(cash: f64, execution_price: f64, config: &ExecutionConfig) -> i64 {
    let budget = cash - config.commission_per_trade;
    if budget <= 0.0 || execution_price <= 0.0 {
        return 0;
    }
    let unit = execution_price * (1.0 + config.commission_pct / 100.0);
    (budget / unit).floor() as i64
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuyResult {
    Filled {
        quantity: i64,
        execution_price: f64,
        commission: f64,
    },
    InsufficientCapital,
}

/// Fill a buy of up to `requested` shares.
///
/// The quantity is clamped to what the portfolio's cash covers.
pub fn fill_buy(
    portfolio: &mut Portfolio,
    code: &str,
    requested: i64,
    market_price: f64,
    date: NaiveDate,
    config: &ExecutionConfig,
) -> BuyResult {
    let execution_price = apply_slippage_buy(market_price, config.slippage_pct);
    let quantity = requested.min(affordable_quantity(portfolio.cash, execution_price, config));

    if quantity <= 0 {
        return BuyResult::InsufficientCapital;
    }

    let cost = quantity as f64 * execution_price;
    let commission = calculate_commission(cost, config);
    portfolio.buy(code, quantity, execution_price, date, commission);

    BuyResult::Filled {
        quantity,
        execution_price,
        commission,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellResult {
    pub quantity: i64,
    pub exit_price: f64,
    pub exit_value: f64,
    pub exit_commission: f64,
    pub pnl: f64,
}

/// Fill a sell of up to `requested` shares of an existing position.
///
/// Returns `None` when nothing is held. Selling the last share removes the
/// position; every sale is recorded as a closed trade.
pub fn fill_sell(
    portfolio: &mut Portfolio,
    code: &str,
    requested: i64,
    market_price: f64,
    exit_date: NaiveDate,
    config: &ExecutionConfig,
) -> Option<SellResult> {
    let position = portfolio.get_position_mut(code)?;
    let quantity = requested.min(position.quantity);
    if quantity <= 0 {
        return None;
    }

    let exit_price = apply_slippage_sell(market_price, config.slippage_pct);
    let exit_value = quantity as f64 * exit_price;
    let exit_commission = calculate_commission(exit_value, config);

    let entry_price = position.entry_price;
    let entry_date = position.entry_date;
    let entry_commission = position.remove_shares(quantity);
    let emptied = position.quantity == 0;

    let pnl = quantity as f64 * (exit_price - entry_price) - entry_commission - exit_commission;

    portfolio.cash += exit_value - exit_commission;
    if emptied {
        portfolio.remove_position(code);
    }

    portfolio.record_trade(ClosedTrade {
        code: code.to_string(),
        quantity,
        entry_price,
        exit_price,
        entry_date,
        exit_date,
        pnl,
    });

    Some(SellResult {
        quantity,
        exit_price,
        exit_value,
        exit_commission,
        pnl,
    })
}
