//! Core domain types and logic.

pub mod allocation;
pub mod analysis;
pub mod backtest;
pub mod code_data;
pub mod config_validation;
pub mod correction;
pub mod decision;
pub mod error;
pub mod execution;
pub mod metrics;
pub mod ohlcv;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod ranking;
pub mod search;
pub mod strategy;
pub mod universe;
pub mod upturn;
