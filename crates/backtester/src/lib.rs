//! # Quorum Backtester
//!
//! Drives the orchestrator across an ascending sequence of dates against a simulated
//! portfolio and reports on the resulting equity curve.
//!
//! ## Public API
//!
//! - `Backtester`: the state machine (`Initialized -> Stepping -> Completed`, or
//!   `Aborted`).
//! - `submit_backtest` / `BacktestHandle`: run one in the background with live progress.
//! - `business_days`: the default date sequence.
//! - `write_report`: the JSON report artifact.

pub mod backtester;
pub mod calendar;
pub mod error;
pub mod handle;
pub mod report;

pub use backtester::{BacktestState, Backtester};
pub use calendar::business_days;
pub use error::BacktestError;
pub use handle::{BacktestHandle, submit_backtest};
pub use report::{read_report, write_report};
