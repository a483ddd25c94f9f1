use crate::error::AnalyticsError;
use crate::report::{DailyReturn, PerformanceReport, SessionRecord, ValuationPoint};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

const TRADING_DAYS_PER_YEAR: u32 = 252;

/// A stateless calculator for deriving performance metrics from a valuation series.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point for calculating performance metrics.
    ///
    /// # Arguments
    ///
    /// * `session` - The valuations, fault log and trade count of a backtest. The
    ///   valuations must be in ascending date order.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `PerformanceReport` or an `AnalyticsError`.
    pub fn calculate(&self, session: &SessionRecord) -> Result<PerformanceReport, AnalyticsError> {
        let mut report = PerformanceReport::flat(session.initial_capital);
        report.trades_executed = session.trades_executed;
        report.realized_gains = session.realized_gains;
        report.fault_log = session.fault_log.clone();

        let Some(last) = session.valuations.last() else {
            return Err(AnalyticsError::NotEnoughData(
                "a report needs at least one valuation".to_string(),
            ));
        };
        report.final_value = last.total_value;
        report.trading_days = session.valuations.len();
        report.valuations = session.valuations.clone();

        self.calculate_profitability(session, &mut report)?;
        self.calculate_drawdown(session.initial_capital, &session.valuations, &mut report);
        let returns = self.calculate_returns(session.initial_capital, &session.valuations)?;
        self.calculate_ratios(&returns, &mut report)?;
        report.daily_returns = returns
            .into_iter()
            .map(|(date, r)| DailyReturn {
                date,
                return_pct: (r * Decimal::ONE_HUNDRED).round_dp(4),
            })
            .collect();

        tracing::debug!(
            final_value = %report.final_value,
            total_return_pct = %report.total_return_pct,
            max_drawdown_pct = %report.max_drawdown_pct,
            "Performance report calculated."
        );
        Ok(report)
    }

    fn calculate_profitability(
        &self,
        session: &SessionRecord,
        report: &mut PerformanceReport,
    ) -> Result<(), AnalyticsError> {
        report.total_net_profit = report.final_value - session.initial_capital;
        if session.initial_capital <= Decimal::ZERO {
            return Err(AnalyticsError::DivisionByZero("total_return_pct".to_string()));
        }
        report.total_return_pct =
            ((report.total_net_profit / session.initial_capital) * Decimal::ONE_HUNDRED).round_dp(4);
        Ok(())
    }

    /// Calculates maximum drawdown from the valuation series, measured against the
    /// running peak (which starts at the initial capital).
    fn calculate_drawdown(
        &self,
        initial_capital: Decimal,
        valuations: &[ValuationPoint],
        report: &mut PerformanceReport,
    ) {
        let mut peak = initial_capital;

        for point in valuations {
            if point.total_value > peak {
                peak = point.total_value;
            }
            let drawdown = peak - point.total_value;
            if drawdown > report.max_drawdown {
                report.max_drawdown = drawdown;
                report.max_drawdown_date = Some(point.date);
                if peak > Decimal::ZERO {
                    report.max_drawdown_pct = ((drawdown / peak) * Decimal::ONE_HUNDRED).round_dp(4);
                }
            }
        }
    }

    /// Fractional return of each valuation over the one before it; the first date is
    /// measured against the initial capital.
    fn calculate_returns(
        &self,
        initial_capital: Decimal,
        valuations: &[ValuationPoint],
    ) -> Result<Vec<(chrono::NaiveDate, Decimal)>, AnalyticsError> {
        let mut previous = initial_capital;
        let mut returns = Vec::with_capacity(valuations.len());
        for point in valuations {
            if previous.is_zero() {
                return Err(AnalyticsError::DivisionByZero("daily_return".to_string()));
            }
            returns.push((point.date, (point.total_value - previous) / previous));
            previous = point.total_value;
        }
        Ok(returns)
    }

    /// Calculates all ratio-based metrics like Sharpe, Sortino and Calmar.
    ///
    /// Ratios are annualised over 252 trading days with a zero risk-free rate.
    fn calculate_ratios(
        &self,
        returns: &[(chrono::NaiveDate, Decimal)],
        report: &mut PerformanceReport,
    ) -> Result<(), AnalyticsError> {
        // --- Calmar Ratio ---
        if report.max_drawdown_pct > Decimal::ZERO {
            report.calmar_ratio = Some((report.total_return_pct / report.max_drawdown_pct).round_dp(4));
        }

        if returns.len() < 2 {
            return Ok(());
        }
        let count = Decimal::from(returns.len());
        let mean_return = returns.iter().map(|(_, r)| *r).sum::<Decimal>() / count;
        let annualizer = Decimal::from(TRADING_DAYS_PER_YEAR)
            .sqrt()
            .ok_or_else(|| AnalyticsError::InternalError("Failed to annualise".to_string()))?;

        // --- Sharpe Ratio ---
        let variance = returns
            .iter()
            .map(|(_, r)| (*r - mean_return) * (*r - mean_return))
            .sum::<Decimal>()
            / (count - Decimal::ONE);
        if variance > Decimal::ZERO {
            let std_dev = variance.sqrt().ok_or_else(|| {
                AnalyticsError::InternalError("Failed to calculate square root for variance".to_string())
            })?;
            report.sharpe_ratio = Some((mean_return / std_dev * annualizer).round_dp(4));
        }

        // --- Sortino Ratio ---
        let downside = returns
            .iter()
            .filter(|(_, r)| r.is_sign_negative() && !r.is_zero())
            .map(|(_, r)| *r * *r)
            .sum::<Decimal>()
            / count;
        if downside > Decimal::ZERO {
            let downside_dev = downside.sqrt().ok_or_else(|| {
                AnalyticsError::InternalError("Failed to calculate downside deviation".to_string())
            })?;
            report.sortino_ratio = Some((mean_return / downside_dev * annualizer).round_dp(4));
        }

        Ok(())
    }
}
