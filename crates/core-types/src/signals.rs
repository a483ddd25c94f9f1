use crate::enums::{Action, Stance};
use crate::structs::Instrument;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Upper bound of the confidence scale.
pub const MAX_CONFIDENCE: Decimal = Decimal::ONE_HUNDRED;

/// The output of one analyst for one instrument.
///
/// Immutable once built: the node that produced it owns it, downstream nodes and
/// the aggregator only ever read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalResult {
    /// Identity of the node that produced the signal.
    pub source: String,
    pub stance: Stance,
    /// Confidence in [0, 100].
    pub confidence: Decimal,
    pub rationale: String,
    /// The as-of date of the data the signal was computed from.
    pub as_of: NaiveDate,
}

impl SignalResult {
    /// Builds a signal, clamping confidence into [0, 100] and rounding it to two places.
    pub fn new(
        source: impl Into<String>,
        stance: Stance,
        confidence: Decimal,
        rationale: impl Into<String>,
        as_of: NaiveDate,
    ) -> Self {
        Self {
            source: source.into(),
            stance,
            confidence: confidence.clamp(Decimal::ZERO, MAX_CONFIDENCE).round_dp(2),
            rationale: rationale.into(),
            as_of,
        }
    }

    /// The neutral stand-in used when an analyst could not obtain its data.
    pub fn neutral_substitute(source: impl Into<String>, as_of: NaiveDate, reason: &str) -> Self {
        Self::new(
            source,
            Stance::Neutral,
            Decimal::ZERO,
            format!("Data unavailable: {}", reason),
            as_of,
        )
    }
}

/// The aggregator's final, actionable recommendation for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub instrument: Instrument,
    pub action: Action,
    /// Number of shares to trade. Always zero for `Hold`.
    pub quantity: u64,
    /// Confidence in [0, 100].
    pub confidence: Decimal,
    pub rationale: String,
    /// Identities of the signals that contributed to the decision.
    pub contributors: Vec<String>,
}

impl Decision {
    pub fn hold(instrument: Instrument, confidence: Decimal, rationale: impl Into<String>) -> Self {
        Self {
            instrument,
            action: Action::Hold,
            quantity: 0,
            confidence: confidence.clamp(Decimal::ZERO, MAX_CONFIDENCE),
            rationale: rationale.into(),
            contributors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn confidence_is_clamped() {
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let high = SignalResult::new("a", Stance::Bullish, dec!(140), "", as_of);
        let low = SignalResult::new("a", Stance::Bearish, dec!(-3), "", as_of);
        assert_eq!(high.confidence, dec!(100));
        assert_eq!(low.confidence, dec!(0));
    }

    #[test]
    fn substitute_is_neutral_with_zero_confidence() {
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let s = SignalResult::neutral_substitute("fundamentals", as_of, "no financial metrics");
        assert_eq!(s.stance, Stance::Neutral);
        assert_eq!(s.confidence, Decimal::ZERO);
        assert!(s.rationale.contains("no financial metrics"));
    }
}
