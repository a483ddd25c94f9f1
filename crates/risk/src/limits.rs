use crate::RiskEvaluator;
use crate::error::RiskError;
use chrono::NaiveDate;
use configuration::RiskSettings;
use core_types::{Instrument, PortfolioSnapshot, PriceBar};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// What the risk node hands to the aggregator for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Close of the latest bar on or before the as-of date. `None` when no bar exists.
    pub current_price: Option<Decimal>,
    pub price_date: Option<NaiveDate>,
    pub annualized_volatility: Option<f64>,
    /// Total value this instrument may occupy.
    pub position_limit: Decimal,
    /// What is left of the limit after the existing position.
    pub remaining_limit: Decimal,
    pub max_shares: u64,
    pub rationale: String,
}

impl RiskAssessment {
    /// An assessment that permits nothing, used when no price is known.
    pub fn unpriced(rationale: impl Into<String>) -> Self {
        Self {
            current_price: None,
            price_date: None,
            annualized_volatility: None,
            position_limit: Decimal::ZERO,
            remaining_limit: Decimal::ZERO,
            max_shares: 0,
            rationale: rationale.into(),
        }
    }
}

/// Limits each instrument to a fraction of total equity, scaled by its volatility regime.
///
/// | annualised volatility     | multiplier |
/// |---------------------------|------------|
/// | below 15%                 | 1.25       |
/// | 15% to 30%                | 1.00       |
/// | 30% to `high_volatility`  | 0.75       |
/// | `high_volatility` and up  | 0.50       |
#[derive(Debug, Clone)]
pub struct VolatilityAdjustedLimits {
    params: RiskSettings,
}

impl VolatilityAdjustedLimits {
    pub fn new(params: RiskSettings) -> Result<Self, RiskError> {
        if params.max_position_pct <= dec!(0) || params.max_position_pct > dec!(1) {
            return Err(RiskError::InvalidParameters(
                "max_position_pct must be in (0, 1]".to_string(),
            ));
        }
        if params.volatility_lookback_days < 2 {
            return Err(RiskError::InvalidParameters(
                "volatility_lookback_days must be at least 2".to_string(),
            ));
        }
        if params.high_volatility <= dec!(0.30) {
            return Err(RiskError::InvalidParameters(
                "high_volatility must be above 0.30".to_string(),
            ));
        }
        Ok(Self { params })
    }

    fn multiplier(&self, volatility: Option<f64>) -> Decimal {
        let Some(vol) = volatility else {
            return dec!(1);
        };
        let high = self.params.high_volatility.to_f64().unwrap_or(0.5);
        if vol < 0.15 {
            dec!(1.25)
        } else if vol < 0.30 {
            dec!(1)
        } else if vol < high {
            dec!(0.75)
        } else {
            dec!(0.5)
        }
    }

    /// Annualised standard deviation of daily close-to-close returns over the
    /// configured lookback. `None` with fewer than two returns.
    fn annualized_volatility(&self, bars: &[&PriceBar]) -> Option<f64> {
        let window = self.params.volatility_lookback_days + 1;
        let start = bars.len().saturating_sub(window);
        let closes: Vec<f64> = bars[start..]
            .iter()
            .filter_map(|bar| bar.close.to_f64())
            .collect();
        let returns: Vec<f64> = closes
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        if returns.len() < 2 {
            return None;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        Some(variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt())
    }
}

impl RiskEvaluator for VolatilityAdjustedLimits {
    fn assess(
        &self,
        instrument: &Instrument,
        prices: &[PriceBar],
        as_of: NaiveDate,
        portfolio: &PortfolioSnapshot,
    ) -> Result<RiskAssessment, RiskError> {
        let mut bars: Vec<&PriceBar> = prices.iter().filter(|bar| bar.date <= as_of).collect();
        bars.sort_by_key(|bar| bar.date);

        let Some(latest) = bars.last() else {
            tracing::warn!(instrument = %instrument, %as_of, "No price data; position limit is zero.");
            return Ok(RiskAssessment::unpriced(format!(
                "No price data for {} on or before {}",
                instrument, as_of
            )));
        };
        let price = latest.close;
        if price <= Decimal::ZERO {
            return Err(RiskError::InvalidPrice {
                symbol: instrument.symbol().to_string(),
                date: latest.date,
                close: price,
            });
        }

        let volatility = self.annualized_volatility(&bars);
        let pct = (self.params.max_position_pct * self.multiplier(volatility)).min(dec!(1));
        let position_limit = (portfolio.equity.max(Decimal::ZERO) * pct).round_dp(2);

        let position = portfolio.position(instrument);
        let net_shares = Decimal::from(position.long) - Decimal::from(position.short);
        let current_value = (net_shares * price).abs();
        let remaining_limit = (position_limit - current_value).max(Decimal::ZERO);
        let max_shares = (remaining_limit.min(portfolio.cash.max(Decimal::ZERO)) / price)
            .floor()
            .to_u64()
            .unwrap_or(0);

        let rationale = format!(
            "price {} on {}; volatility {}; limit {}% of equity = {}; {} already committed",
            price,
            latest.date,
            volatility
                .and_then(Decimal::from_f64)
                .map(|v| format!("{}%", (v * dec!(100)).round_dp(1)))
                .unwrap_or_else(|| "unknown".to_string()),
            (pct * dec!(100)).round_dp(1),
            position_limit,
            current_value,
        );
        tracing::debug!(
            instrument = %instrument,
            %price,
            ?volatility,
            %position_limit,
            %remaining_limit,
            max_shares,
            "Risk assessed."
        );

        Ok(RiskAssessment {
            current_price: Some(price),
            price_date: Some(latest.date),
            annualized_volatility: volatility,
            position_limit,
            remaining_limit,
            max_shares,
            rationale,
        })
    }
}
