//! Session Breakout Backtester
//!
//! Research backtester for an intraday breakout-continuation strategy:
//! tick data is resampled into session bars, setups are found on a
//! structural timeframe, entries and exits are simulated on an execution
//! timeframe, and a parameter sweep ranks every combination by mean R.

pub mod backtest;
pub mod config;
pub mod data;
pub mod grid;
pub mod optimizer;
pub mod report;
pub mod resample;
pub mod risk;
pub mod setup;
pub mod simulator;
pub mod swing;
pub mod types;

pub use config::Config;
pub use types::*;
