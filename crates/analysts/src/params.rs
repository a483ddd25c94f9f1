use crate::error::AnalystError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;

/// Named numeric parameters, as given in `[[analysts]] params` or as run overrides.
pub type ParamMap = BTreeMap<String, Decimal>;

/// Looks a parameter up in the run overrides first, then the configured parameters.
pub(crate) fn lookup(base: &ParamMap, overrides: &ParamMap, key: &str) -> Option<Decimal> {
    overrides.get(key).or_else(|| base.get(key)).copied()
}

pub(crate) fn decimal_or(base: &ParamMap, overrides: &ParamMap, key: &str, default: Decimal) -> Decimal {
    lookup(base, overrides, key).unwrap_or(default)
}

/// A positive whole-number parameter such as an indicator period.
pub(crate) fn period_or(
    base: &ParamMap,
    overrides: &ParamMap,
    key: &str,
    default: usize,
) -> Result<usize, AnalystError> {
    match lookup(base, overrides, key) {
        None => Ok(default),
        Some(value) => match value.to_usize() {
            Some(n) if n > 0 && value.fract().is_zero() => Ok(n),
            _ => Err(AnalystError::InvalidParameters(format!(
                "'{}' must be a positive integer, got {}",
                key, value
            ))),
        },
    }
}

/// A weight or ratio parameter in [0, 1].
pub(crate) fn fraction_or(
    base: &ParamMap,
    overrides: &ParamMap,
    key: &str,
    default: f64,
) -> Result<f64, AnalystError> {
    match lookup(base, overrides, key) {
        None => Ok(default),
        Some(value) => match value.to_f64() {
            Some(f) if (0.0..=1.0).contains(&f) => Ok(f),
            _ => Err(AnalystError::InvalidParameters(format!(
                "'{}' must lie in [0, 1], got {}",
                key, value
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn overrides_win_over_base() {
        let base = ParamMap::from([("rsi_period".to_string(), dec!(14))]);
        let overrides = ParamMap::from([("rsi_period".to_string(), dec!(10))]);
        assert_eq!(period_or(&base, &overrides, "rsi_period", 5).unwrap(), 10);
        assert_eq!(period_or(&base, &ParamMap::new(), "rsi_period", 5).unwrap(), 14);
        assert_eq!(period_or(&base, &overrides, "missing", 5).unwrap(), 5);
    }

    #[test]
    fn rejects_fractional_periods_and_out_of_range_weights() {
        let base = ParamMap::from([
            ("period".to_string(), dec!(2.5)),
            ("weight".to_string(), dec!(1.5)),
        ]);
        assert!(period_or(&base, &ParamMap::new(), "period", 5).is_err());
        assert!(fraction_or(&base, &ParamMap::new(), "weight", 0.3).is_err());
    }
}
