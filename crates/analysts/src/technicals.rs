use crate::error::AnalystError;
use crate::params::{ParamMap, decimal_or, period_or};
use crate::producer::{DataRequirements, EvaluationContext, SignalProducer, UpstreamSignals};
use async_trait::async_trait;
use core_types::{AnalystId, DataDomain, DataSet, FieldSet, Instrument, PriceBar, SignalResult, Stance};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use ta::Next as _;
use ta::indicators::{BollingerBands, ExponentialMovingAverage as Ema, RelativeStrengthIndex as Rsi};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Weights of the sub-strategies in the combined score.
const TREND_WEIGHT: f64 = 0.25;
const MEAN_REVERSION_WEIGHT: f64 = 0.35;
const MOMENTUM_WEIGHT: f64 = 0.25;
const VOLATILITY_WEIGHT: f64 = 0.15;

/// A multi-strategy technical analyst.
///
/// Four sub-strategies each produce a stance and a confidence in [0, 1]:
/// 1. Trend: EMA 8/21/55 alignment.
/// 2. Mean reversion: 50-day z-score confirmed by the Bollinger band position.
/// 3. Momentum: weighted 1/3/6-month returns, confirmed by volume.
/// 4. Volatility: the current volatility regime against its own history.
///
/// The combined score is the confidence-weighted average of the stances' directions.
/// Above the threshold it is bullish, below its negation bearish.
#[derive(Debug, Clone)]
pub struct Technicals {
    params: ParamMap,
}

#[derive(Debug, Clone, PartialEq)]
struct SubSignal {
    name: &'static str,
    stance: Stance,
    confidence: f64,
    detail: String,
}

impl SubSignal {
    fn neutral(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            stance: Stance::Neutral,
            confidence: 0.5,
            detail: detail.into(),
        }
    }
}

fn to_f64(value: Decimal) -> Result<f64, AnalystError> {
    value
        .to_f64()
        .ok_or_else(|| AnalystError::IndicatorError(format!("cannot convert {} to f64", value)))
}

/// Runs an EMA over the whole series and returns its last value.
fn ema_last(closes: &[f64], period: usize) -> Result<f64, AnalystError> {
    let mut ema = Ema::new(period)
        .map_err(|e| AnalystError::InvalidParameters(format!("Failed to initialize EMA: {:?}", e)))?;
    Ok(closes.iter().fold(0.0, |_, close| ema.next(*close)))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn trend(closes: &[f64]) -> Result<SubSignal, AnalystError> {
    if closes.len() < 55 {
        return Ok(SubSignal::neutral("trend", "fewer than 55 bars"));
    }
    let ema_8 = ema_last(closes, 8)?;
    let ema_21 = ema_last(closes, 21)?;
    let ema_55 = ema_last(closes, 55)?;
    let strength = if ema_55 != 0.0 {
        ((ema_8 - ema_55).abs() / ema_55 * 10.0).min(1.0)
    } else {
        0.0
    };
    let detail = format!("EMA8 {:.2}, EMA21 {:.2}, EMA55 {:.2}", ema_8, ema_21, ema_55);

    let signal = if ema_8 > ema_21 && ema_21 > ema_55 {
        SubSignal { name: "trend", stance: Stance::Bullish, confidence: strength, detail }
    } else if ema_8 < ema_21 && ema_21 < ema_55 {
        SubSignal { name: "trend", stance: Stance::Bearish, confidence: strength, detail }
    } else {
        SubSignal::neutral("trend", detail)
    };
    Ok(signal)
}

fn mean_reversion(closes: &[f64], rsi_period: usize) -> Result<SubSignal, AnalystError> {
    if closes.len() < 50 {
        return Ok(SubSignal::neutral("mean reversion", "fewer than 50 bars"));
    }
    let window = &closes[closes.len() - 50..];
    let last = closes[closes.len() - 1];
    let sd = std_dev(window);
    if sd == 0.0 {
        return Ok(SubSignal::neutral("mean reversion", "flat prices"));
    }
    let z_score = (last - mean(window)) / sd;

    let mut bb = BollingerBands::new(20, 2.0)
        .map_err(|e| AnalystError::InvalidParameters(format!("Failed to initialize Bollinger Bands: {:?}", e)))?;
    let mut rsi = Rsi::new(rsi_period)
        .map_err(|e| AnalystError::InvalidParameters(format!("Failed to initialize RSI: {:?}", e)))?;
    let mut band = None;
    let mut rsi_val = 50.0;
    for close in closes {
        band = Some(bb.next(*close));
        rsi_val = rsi.next(*close);
    }
    let position = match band {
        Some(b) if b.upper > b.lower => (last - b.lower) / (b.upper - b.lower),
        _ => 0.5,
    };

    let detail = format!("z-score {:.2}, band position {:.2}, RSI {:.1}", z_score, position, rsi_val);
    let confidence = (z_score.abs() / 4.0).min(1.0);
    let signal = if z_score < -2.0 && position < 0.2 {
        SubSignal { name: "mean reversion", stance: Stance::Bullish, confidence, detail }
    } else if z_score > 2.0 && position > 0.8 {
        SubSignal { name: "mean reversion", stance: Stance::Bearish, confidence, detail }
    } else {
        SubSignal::neutral("mean reversion", detail)
    };
    Ok(signal)
}

fn momentum(closes: &[f64], volumes: &[f64]) -> SubSignal {
    let returns = daily_returns(closes);
    if returns.len() < 21 {
        return SubSignal::neutral("momentum", "fewer than 21 returns");
    }
    let trailing = |n: usize| -> f64 { returns[returns.len().saturating_sub(n)..].iter().sum() };
    let score = 0.4 * trailing(21) + 0.3 * trailing(63) + 0.3 * trailing(126);

    let recent_volume = &volumes[volumes.len().saturating_sub(21)..];
    let volume_ma = mean(recent_volume);
    let confirmed = volume_ma > 0.0 && volumes.last().is_some_and(|v| *v / volume_ma > 1.0);

    let detail = format!("score {:.3}, volume confirmed {}", score, confirmed);
    let confidence = (score.abs() * 5.0).min(1.0);
    if score > 0.05 && confirmed {
        SubSignal { name: "momentum", stance: Stance::Bullish, confidence, detail }
    } else if score < -0.05 && confirmed {
        SubSignal { name: "momentum", stance: Stance::Bearish, confidence, detail }
    } else {
        SubSignal::neutral("momentum", detail)
    }
}

fn volatility(closes: &[f64]) -> SubSignal {
    let returns = daily_returns(closes);
    if returns.len() < 21 + 63 {
        return SubSignal::neutral("volatility", "insufficient history for a regime");
    }
    let history: Vec<f64> = returns
        .windows(21)
        .map(|w| std_dev(w) * TRADING_DAYS_PER_YEAR.sqrt())
        .collect();
    let current = history[history.len() - 1];
    let recent = &history[history.len() - 63..];
    let vol_ma = mean(recent);
    let vol_sd = std_dev(recent);
    if vol_ma == 0.0 || vol_sd == 0.0 {
        return SubSignal::neutral("volatility", "constant volatility");
    }
    let regime = current / vol_ma;
    let vol_z = (current - vol_ma) / vol_sd;

    let detail = format!("annualised {:.2}, regime {:.2}, z {:.2}", current, regime, vol_z);
    let confidence = (vol_z.abs() / 3.0).min(1.0);
    if regime < 0.8 && vol_z < -1.0 {
        SubSignal { name: "volatility", stance: Stance::Bullish, confidence, detail }
    } else if regime > 1.2 && vol_z > 1.0 {
        SubSignal { name: "volatility", stance: Stance::Bearish, confidence, detail }
    } else {
        SubSignal::neutral("volatility", detail)
    }
}

/// Confidence-weighted average direction in [-1, 1].
fn combine(signals: &[(SubSignal, f64)]) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (signal, weight) in signals {
        weighted += f64::from(signal.stance.direction()) * weight * signal.confidence;
        total += weight * signal.confidence;
    }
    if total > 0.0 { weighted / total } else { 0.0 }
}

impl Technicals {
    /// Recognised parameters: `min_bars` (20), `lookback_days` (250), `rsi_period` (14),
    /// `signal_threshold` (0.2).
    pub fn new(params: ParamMap) -> Result<Self, AnalystError> {
        let empty = ParamMap::new();
        period_or(&params, &empty, "min_bars", 20)?;
        period_or(&params, &empty, "lookback_days", 250)?;
        period_or(&params, &empty, "rsi_period", 14)?;
        Ok(Self { params })
    }
}

impl Default for Technicals {
    fn default() -> Self {
        Self {
            params: ParamMap::new(),
        }
    }
}

#[async_trait]
impl SignalProducer for Technicals {
    fn id(&self) -> &str {
        AnalystId::Technicals.as_str()
    }

    fn requirements(&self) -> DataRequirements {
        let lookback = period_or(&self.params, &ParamMap::new(), "lookback_days", 250).unwrap_or(250);
        DataRequirements {
            fields: vec![FieldSet::new(DataDomain::Prices, ["close", "volume"])],
            lookback_days: Some(u32::try_from(lookback).unwrap_or(u32::MAX)),
        }
    }

    async fn evaluate(
        &self,
        instrument: &Instrument,
        data: &DataSet,
        _upstream: &UpstreamSignals,
        context: &EvaluationContext,
    ) -> Result<SignalResult, AnalystError> {
        let min_bars = period_or(&self.params, &context.overrides, "min_bars", 20)?;
        let rsi_period = period_or(&self.params, &context.overrides, "rsi_period", 14)?;
        let threshold = to_f64(decimal_or(&self.params, &context.overrides, "signal_threshold", dec!(0.2)))?;

        let mut bars: Vec<&PriceBar> = data.prices.iter().filter(|b| b.date <= context.as_of).collect();
        bars.sort_by_key(|b| b.date);
        if bars.len() < min_bars {
            return Err(AnalystError::DataUnavailable(format!(
                "{} daily bars for {}, need at least {}",
                bars.len(),
                instrument,
                min_bars
            )));
        }
        let closes = bars.iter().map(|b| to_f64(b.close)).collect::<Result<Vec<f64>, _>>()?;
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

        let signals = [
            (trend(&closes)?, TREND_WEIGHT),
            (mean_reversion(&closes, rsi_period)?, MEAN_REVERSION_WEIGHT),
            (momentum(&closes, &volumes), MOMENTUM_WEIGHT),
            (volatility(&closes), VOLATILITY_WEIGHT),
        ];
        let score = combine(&signals);
        let stance = if score > threshold {
            Stance::Bullish
        } else if score < -threshold {
            Stance::Bearish
        } else {
            Stance::Neutral
        };
        let confidence = Decimal::from_f64(score.abs() * 100.0).unwrap_or_default();

        let rationale = signals
            .iter()
            .map(|(s, _)| format!("{}: {} {:.0}% ({})", s.name, s.stance, s.confidence * 100.0, s.detail))
            .collect::<Vec<_>>()
            .join("; ");

        tracing::debug!(instrument = %instrument, stance = %stance, score, "Technicals evaluated.");
        Ok(SignalResult::new(self.id(), stance, confidence, rationale, context.as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use core_types::Market;

    fn series(closes: &[f64]) -> DataSet {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        DataSet {
            prices: closes
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let close = Decimal::from_f64(*c).unwrap();
                    PriceBar {
                        date: start + Duration::days(i as i64),
                        open: close,
                        high: close,
                        low: close,
                        close,
                        volume: 1_000 + i as u64,
                    }
                })
                .collect(),
            ..Default::default()
        }
    }

    async fn run(data: &DataSet) -> Result<SignalResult, AnalystError> {
        Technicals::default()
            .evaluate(
                &Instrument::new("AAA", Market::Us),
                data,
                &UpstreamSignals::new(),
                &EvaluationContext::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            )
            .await
    }

    #[tokio::test]
    async fn steady_uptrend_is_bullish() {
        let closes: Vec<f64> = (0..200).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let signal = run(&series(&closes)).await.unwrap();
        assert_eq!(signal.stance, Stance::Bullish);
        assert!(signal.confidence > Decimal::ZERO);
        assert!(signal.rationale.contains("trend: bullish"));
    }

    #[tokio::test]
    async fn steady_downtrend_is_bearish() {
        let closes: Vec<f64> = (0..200).map(|i| 100.0 * 0.99_f64.powi(i)).collect();
        let signal = run(&series(&closes)).await.unwrap();
        assert_eq!(signal.stance, Stance::Bearish);
    }

    #[tokio::test]
    async fn short_history_is_data_unavailable() {
        let closes = vec![10.0; 5];
        let err = run(&series(&closes)).await.unwrap_err();
        assert!(matches!(err, AnalystError::DataUnavailable(_)));
    }

    #[test]
    fn combine_weights_by_confidence() {
        let bull = SubSignal { name: "a", stance: Stance::Bullish, confidence: 1.0, detail: String::new() };
        let bear = SubSignal { name: "b", stance: Stance::Bearish, confidence: 0.5, detail: String::new() };
        let score = combine(&[(bull, 0.5), (bear, 0.5)]);
        assert!((score - (0.5 - 0.25) / 0.75).abs() < 1e-9);
    }
}
