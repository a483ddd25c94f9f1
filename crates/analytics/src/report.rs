use chrono::NaiveDate;
use core_types::Instrument;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The portfolio's marked-to-market value at the close of one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationPoint {
    pub date: NaiveDate,
    pub total_value: Decimal,
    pub cash: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReturn {
    pub date: NaiveDate,
    /// Percentage change from the previous valuation.
    pub return_pct: Decimal,
}

/// A fault that forced an implicit hold for one instrument on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub date: NaiveDate,
    pub instrument: Instrument,
    /// The graph node that failed, when the fault is attributable to one.
    pub node: Option<String>,
    pub message: String,
}

/// Everything a backtest collected, handed to `AnalyticsEngine::calculate`.
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub initial_capital: Decimal,
    pub valuations: Vec<ValuationPoint>,
    pub fault_log: Vec<FaultRecord>,
    pub trades_executed: usize,
    pub realized_gains: Decimal,
}

/// A standardized report of a backtest's performance.
///
/// This struct is the final output of the `AnalyticsEngine` and the artifact the
/// backtester writes to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    // I. Core Profitability Metrics
    pub initial_value: Decimal,
    pub final_value: Decimal,
    pub total_net_profit: Decimal,
    pub total_return_pct: Decimal,
    pub realized_gains: Decimal,

    // II. Risk and Drawdown
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,
    pub max_drawdown_date: Option<NaiveDate>,
    pub sharpe_ratio: Option<Decimal>, // Option<> for cases with no stdev
    pub sortino_ratio: Option<Decimal>, // Option<> when no day lost value
    pub calmar_ratio: Option<Decimal>, // Option<> for cases with no drawdown

    // III. Activity
    pub trades_executed: usize,
    pub trading_days: usize,

    // IV. Series
    pub daily_returns: Vec<DailyReturn>,
    pub valuations: Vec<ValuationPoint>,
    pub fault_log: Vec<FaultRecord>,
}

impl PerformanceReport {
    /// Creates a report for a session that never moved from its starting capital.
    pub fn flat(initial_value: Decimal) -> Self {
        Self {
            initial_value,
            final_value: initial_value,
            total_net_profit: Decimal::ZERO,
            total_return_pct: Decimal::ZERO,
            realized_gains: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: Decimal::ZERO,
            max_drawdown_date: None,
            sharpe_ratio: None,
            sortino_ratio: None,
            calmar_ratio: None,
            trades_executed: 0,
            trading_days: 0,
            daily_returns: Vec::new(),
            valuations: Vec::new(),
            fault_log: Vec::new(),
        }
    }
}
