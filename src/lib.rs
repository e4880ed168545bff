//! AlertGate Library
//!
//! Quantitative core of a crypto alert service: confluence filtering,
//! adaptive cooldowns, and backtesting of past alerts against realised prices.

pub mod backtesting;
pub mod config;
pub mod filters;
pub mod indicators;
pub mod logging;
pub mod persistence;
pub mod pipeline;
pub mod types;

pub use backtesting::{run_backtest, BacktestConfig, BacktestEngine, BacktestError, BacktestReport};
pub use filters::{apply_confluence_filter, CooldownCalculator, FilterResult};
pub use indicators::IndicatorSnapshot;
