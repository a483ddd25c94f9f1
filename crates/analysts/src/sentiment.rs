use crate::error::AnalystError;
use crate::params::{ParamMap, fraction_or};
use crate::producer::{DataRequirements, EvaluationContext, SignalProducer, UpstreamSignals};
use async_trait::async_trait;
use core_types::{
    AnalystId, DataDomain, DataSet, FieldSet, Instrument, NewsSentiment, SignalResult, Stance,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

const DEFAULT_INSIDER_WEIGHT: f64 = 0.3;
const DEFAULT_NEWS_WEIGHT: f64 = 0.7;

/// Weighs insider buying/selling against the tone of recent news.
///
/// Each insider trade votes bullish (buy) or bearish (sell); each news item votes by
/// its sentiment label. Votes are weighted per source and the heavier side wins.
#[derive(Debug, Clone)]
pub struct Sentiment {
    params: ParamMap,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Tally {
    bullish: usize,
    bearish: usize,
    total: usize,
}

impl Sentiment {
    pub fn new(params: ParamMap) -> Result<Self, AnalystError> {
        // Reject bad weights at construction.
        fraction_or(&params, &ParamMap::new(), "insider_weight", DEFAULT_INSIDER_WEIGHT)?;
        fraction_or(&params, &ParamMap::new(), "news_weight", DEFAULT_NEWS_WEIGHT)?;
        Ok(Self { params })
    }

    fn insider_tally(data: &DataSet, context: &EvaluationContext) -> Tally {
        let mut tally = Tally::default();
        for trade in data.insider_trades.iter().filter(|t| t.date <= context.as_of) {
            tally.total += 1;
            if trade.transaction_shares < 0.0 {
                tally.bearish += 1;
            } else {
                tally.bullish += 1;
            }
        }
        tally
    }

    fn news_tally(data: &DataSet, context: &EvaluationContext) -> Tally {
        let mut tally = Tally::default();
        for item in data.news.iter().filter(|n| n.date <= context.as_of) {
            tally.total += 1;
            match item.sentiment {
                Some(NewsSentiment::Positive) => tally.bullish += 1,
                Some(NewsSentiment::Negative) => tally.bearish += 1,
                Some(NewsSentiment::Neutral) | None => {}
            }
        }
        tally
    }
}

impl Default for Sentiment {
    fn default() -> Self {
        Self {
            params: ParamMap::new(),
        }
    }
}

#[async_trait]
impl SignalProducer for Sentiment {
    fn id(&self) -> &str {
        AnalystId::Sentiment.as_str()
    }

    fn requirements(&self) -> DataRequirements {
        DataRequirements {
            fields: vec![FieldSet::all(DataDomain::Ownership)],
            lookback_days: None,
        }
    }

    async fn evaluate(
        &self,
        instrument: &Instrument,
        data: &DataSet,
        _upstream: &UpstreamSignals,
        context: &EvaluationContext,
    ) -> Result<SignalResult, AnalystError> {
        let insider_weight =
            fraction_or(&self.params, &context.overrides, "insider_weight", DEFAULT_INSIDER_WEIGHT)?;
        let news_weight = fraction_or(&self.params, &context.overrides, "news_weight", DEFAULT_NEWS_WEIGHT)?;

        let insider = Self::insider_tally(data, context);
        let news = Self::news_tally(data, context);
        if insider.total == 0 && news.total == 0 {
            return Err(AnalystError::DataUnavailable(format!(
                "no insider trades or news for {}",
                instrument
            )));
        }

        let bullish = insider.bullish as f64 * insider_weight + news.bullish as f64 * news_weight;
        let bearish = insider.bearish as f64 * insider_weight + news.bearish as f64 * news_weight;
        let total = insider.total as f64 * insider_weight + news.total as f64 * news_weight;

        let stance = if bullish > bearish {
            Stance::Bullish
        } else if bearish > bullish {
            Stance::Bearish
        } else {
            Stance::Neutral
        };
        let confidence = if total > 0.0 {
            Decimal::from_f64(bullish.max(bearish) / total * 100.0).unwrap_or_default()
        } else {
            Decimal::ZERO
        };

        let rationale = format!(
            "insider trades: {} buys / {} sells (weight {:.1}); news: {} positive / {} negative of {} (weight {:.1})",
            insider.bullish, insider.bearish, insider_weight, news.bullish, news.bearish, news.total, news_weight
        );
        Ok(SignalResult::new(self.id(), stance, confidence, rationale, context.as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_types::{InsiderTrade, Market, NewsItem};
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn news(d: u32, sentiment: NewsSentiment) -> NewsItem {
        NewsItem {
            date: day(d),
            title: "headline".to_string(),
            sentiment: Some(sentiment),
        }
    }

    async fn run(analyst: &Sentiment, data: &DataSet) -> Result<SignalResult, AnalystError> {
        analyst
            .evaluate(
                &Instrument::new("AAA", Market::Us),
                data,
                &UpstreamSignals::new(),
                &EvaluationContext::new(day(20)),
            )
            .await
    }

    #[tokio::test]
    async fn news_outweighs_insiders() {
        let data = DataSet {
            insider_trades: vec![
                InsiderTrade { date: day(2), transaction_shares: -1_000.0 },
                InsiderTrade { date: day(3), transaction_shares: -200.0 },
            ],
            news: vec![news(4, NewsSentiment::Positive), news(5, NewsSentiment::Positive)],
            ..Default::default()
        };
        let signal = run(&Sentiment::default(), &data).await.unwrap();
        // bullish 1.4 vs bearish 0.6 out of 2.0
        assert_eq!(signal.stance, Stance::Bullish);
        assert_eq!(signal.confidence, dec!(70));
    }

    #[tokio::test]
    async fn future_records_are_ignored() {
        let data = DataSet {
            news: vec![news(25, NewsSentiment::Negative)],
            ..Default::default()
        };
        let err = run(&Sentiment::default(), &data).await.unwrap_err();
        assert!(matches!(err, AnalystError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn even_split_is_neutral() {
        let data = DataSet {
            news: vec![news(1, NewsSentiment::Positive), news(2, NewsSentiment::Negative)],
            ..Default::default()
        };
        let signal = run(&Sentiment::default(), &data).await.unwrap();
        assert_eq!(signal.stance, Stance::Neutral);
    }

    #[test]
    fn rejects_weights_outside_unit_range() {
        let params = ParamMap::from([("news_weight".to_string(), dec!(2))]);
        assert!(Sentiment::new(params).is_err());
    }
}
