use crate::error::AnalystError;
use crate::producer::{DataRequirements, EvaluationContext, SignalProducer, UpstreamSignals};
use async_trait::async_trait;
use core_types::{
    AnalystId, DataDomain, DataSet, FieldSet, FinancialMetrics, Instrument, SignalResult, Stance,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

/// Scores profitability, growth, financial health and price ratios from the latest
/// reporting period, then takes a majority vote across the four.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fundamentals;

/// The outcome of one of the four fundamental checks.
#[derive(Debug, Clone, PartialEq)]
struct Check {
    name: &'static str,
    stance: Stance,
    detail: String,
}

fn above(metric: Option<f64>, threshold: f64) -> bool {
    metric.is_some_and(|m| m > threshold)
}

fn describe(metric: Option<f64>) -> String {
    match metric {
        Some(m) => format!("{:.2}", m),
        None => "n/a".to_string(),
    }
}

/// Two or more passing criteria is bullish, none is bearish.
fn stance_from_score(score: usize) -> Stance {
    match score {
        0 => Stance::Bearish,
        1 => Stance::Neutral,
        _ => Stance::Bullish,
    }
}

fn profitability(m: &FinancialMetrics) -> Check {
    let score = [
        above(m.return_on_equity, 0.15),
        above(m.net_margin, 0.20),
        above(m.operating_margin, 0.15),
    ]
    .iter()
    .filter(|passed| **passed)
    .count();
    Check {
        name: "profitability",
        stance: stance_from_score(score),
        detail: format!(
            "ROE {}, net margin {}, operating margin {}",
            describe(m.return_on_equity),
            describe(m.net_margin),
            describe(m.operating_margin)
        ),
    }
}

fn growth(m: &FinancialMetrics) -> Check {
    let score = [
        above(m.revenue_growth, 0.10),
        above(m.earnings_growth, 0.10),
        above(m.book_value_growth, 0.10),
    ]
    .iter()
    .filter(|passed| **passed)
    .count();
    Check {
        name: "growth",
        stance: stance_from_score(score),
        detail: format!(
            "revenue {}, earnings {}, book value {}",
            describe(m.revenue_growth),
            describe(m.earnings_growth),
            describe(m.book_value_growth)
        ),
    }
}

fn financial_health(m: &FinancialMetrics) -> Check {
    let mut score = 0;
    if above(m.current_ratio, 1.5) {
        score += 1;
    }
    if m.debt_to_equity.is_some_and(|d| d < 0.5) {
        score += 1;
    }
    if let (Some(fcf), Some(eps)) = (m.free_cash_flow_per_share, m.earnings_per_share) {
        if fcf > eps * 0.8 {
            score += 1;
        }
    }
    Check {
        name: "financial health",
        stance: stance_from_score(score),
        detail: format!(
            "current ratio {}, D/E {}",
            describe(m.current_ratio),
            describe(m.debt_to_equity)
        ),
    }
}

/// Expensive on two or more ratios is bearish, cheap on all three is bullish.
fn price_ratios(m: &FinancialMetrics) -> Check {
    let expensive = [
        above(m.price_to_earnings_ratio, 25.0),
        above(m.price_to_book_ratio, 3.0),
        above(m.price_to_sales_ratio, 5.0),
    ]
    .iter()
    .filter(|flag| **flag)
    .count();
    let stance = match expensive {
        0 => Stance::Bullish,
        1 => Stance::Neutral,
        _ => Stance::Bearish,
    };
    Check {
        name: "valuation",
        stance,
        detail: format!(
            "P/E {}, P/B {}, P/S {}",
            describe(m.price_to_earnings_ratio),
            describe(m.price_to_book_ratio),
            describe(m.price_to_sales_ratio)
        ),
    }
}

#[async_trait]
impl SignalProducer for Fundamentals {
    fn id(&self) -> &str {
        AnalystId::Fundamentals.as_str()
    }

    fn requirements(&self) -> DataRequirements {
        DataRequirements {
            fields: vec![FieldSet::all(DataDomain::Financials)],
            lookback_days: Some(400),
        }
    }

    async fn evaluate(
        &self,
        instrument: &Instrument,
        data: &DataSet,
        _upstream: &UpstreamSignals,
        context: &EvaluationContext,
    ) -> Result<SignalResult, AnalystError> {
        let metrics = data.latest_metrics(context.as_of).ok_or_else(|| {
            AnalystError::DataUnavailable(format!("no financial metrics for {}", instrument))
        })?;

        let checks = [
            profitability(metrics),
            growth(metrics),
            financial_health(metrics),
            price_ratios(metrics),
        ];
        let bullish = checks.iter().filter(|c| c.stance == Stance::Bullish).count();
        let bearish = checks.iter().filter(|c| c.stance == Stance::Bearish).count();

        let stance = if bullish > bearish {
            Stance::Bullish
        } else if bearish > bullish {
            Stance::Bearish
        } else {
            Stance::Neutral
        };
        let share = bullish.max(bearish) as f64 / checks.len() as f64;
        let confidence = Decimal::from_f64((share * 100.0).round()).unwrap_or_default();

        let rationale = checks
            .iter()
            .map(|c| format!("{}: {} ({})", c.name, c.stance, c.detail))
            .collect::<Vec<_>>()
            .join("; ");

        tracing::debug!(instrument = %instrument, stance = %stance, bullish, bearish, "Fundamentals evaluated.");
        Ok(SignalResult::new(self.id(), stance, confidence, rationale, context.as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_types::Market;
    use rust_decimal_macros::dec;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()
    }

    fn strong_company() -> FinancialMetrics {
        FinancialMetrics {
            report_period: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            return_on_equity: Some(0.25),
            net_margin: Some(0.22),
            operating_margin: Some(0.30),
            revenue_growth: Some(0.15),
            earnings_growth: Some(0.12),
            book_value_growth: Some(0.05),
            current_ratio: Some(2.0),
            debt_to_equity: Some(0.3),
            free_cash_flow_per_share: Some(5.0),
            earnings_per_share: Some(4.0),
            price_to_earnings_ratio: Some(30.0),
            price_to_book_ratio: Some(2.0),
            price_to_sales_ratio: Some(6.0),
        }
    }

    #[tokio::test]
    async fn majority_vote_sets_stance_and_confidence() {
        let data = DataSet {
            financial_metrics: vec![strong_company()],
            ..Default::default()
        };
        let signal = Fundamentals
            .evaluate(
                &Instrument::new("AAA", Market::Us),
                &data,
                &UpstreamSignals::new(),
                &EvaluationContext::new(as_of()),
            )
            .await
            .unwrap();
        // Profitability, growth and health are bullish; two expensive ratios are bearish.
        assert_eq!(signal.stance, Stance::Bullish);
        assert_eq!(signal.confidence, dec!(75));
        assert!(signal.rationale.contains("valuation: bearish"));
    }

    #[tokio::test]
    async fn missing_metrics_are_data_unavailable() {
        let err = Fundamentals
            .evaluate(
                &Instrument::new("AAA", Market::Us),
                &DataSet::default(),
                &UpstreamSignals::new(),
                &EvaluationContext::new(as_of()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AnalystError::DataUnavailable(_)));
    }

    #[test]
    fn unknown_metrics_count_as_failing() {
        let blank = FinancialMetrics {
            report_period: as_of(),
            ..Default::default()
        };
        assert_eq!(profitability(&blank).stance, Stance::Bearish);
        assert_eq!(price_ratios(&blank).stance, Stance::Bullish);
    }
}
