use analysts::UpstreamSignals;
use configuration::AggregatorSettings;
use core_types::{Action, Decision, Instrument, PortfolioSnapshot, PositionSnapshot, Stance};
use risk::RiskAssessment;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// The largest quantity each action may trade, given cash, margin, the held position
/// and the risk limit. A zero means the action is not allowed. `Hold` is always allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowedActions {
    pub buy: u64,
    pub sell: u64,
    pub short: u64,
    pub cover: u64,
}

impl AllowedActions {
    /// Derives the limits deterministically from the risk assessment and the portfolio.
    pub fn compute(
        risk: &RiskAssessment,
        position: &PositionSnapshot,
        portfolio: &PortfolioSnapshot,
        settings: &AggregatorSettings,
    ) -> Self {
        let mut allowed = Self {
            sell: position.long,
            cover: position.short,
            ..Self::default()
        };
        let Some(price) = risk.current_price.filter(|p| *p > Decimal::ZERO) else {
            return allowed;
        };

        if portfolio.cash > Decimal::ZERO {
            let by_cash = (portfolio.cash / price).floor().to_u64().unwrap_or(0);
            allowed.buy = risk.max_shares.min(by_cash);
        }

        if settings.allow_short && risk.max_shares > 0 {
            let by_margin = if portfolio.margin_requirement <= Decimal::ZERO {
                risk.max_shares
            } else {
                let available = (portfolio.equity / portfolio.margin_requirement - portfolio.margin_used)
                    .max(Decimal::ZERO);
                (available / price).floor().to_u64().unwrap_or(0)
            };
            allowed.short = risk.max_shares.min(by_margin);
        }
        allowed
    }

    pub fn limit(&self, action: Action) -> u64 {
        match action {
            Action::Buy => self.buy,
            Action::Sell => self.sell,
            Action::Short => self.short,
            Action::Cover => self.cover,
            Action::Hold => 0,
        }
    }

    pub fn only_hold(&self) -> bool {
        self.buy == 0 && self.sell == 0 && self.short == 0 && self.cover == 0
    }
}

/// The confidence-weighted balance of the contributing signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consensus {
    pub stance: Stance,
    /// Mean confidence of the signals on the winning side; zero when neutral.
    pub confidence: Decimal,
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
}

impl Consensus {
    pub fn from_signals(signals: &UpstreamSignals) -> Self {
        let mut bullish = (0usize, Decimal::ZERO);
        let mut bearish = (0usize, Decimal::ZERO);
        let mut neutral = 0;
        for (_, signal) in signals.iter() {
            match signal.stance {
                Stance::Bullish => {
                    bullish.0 += 1;
                    bullish.1 += signal.confidence;
                }
                Stance::Bearish => {
                    bearish.0 += 1;
                    bearish.1 += signal.confidence;
                }
                Stance::Neutral => neutral += 1,
            }
        }

        let (stance, side) = if bullish.1 > bearish.1 {
            (Stance::Bullish, bullish)
        } else if bearish.1 > bullish.1 {
            (Stance::Bearish, bearish)
        } else {
            (Stance::Neutral, (0, Decimal::ZERO))
        };
        let confidence = if side.0 > 0 {
            (side.1 / Decimal::from(side.0)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Self {
            stance,
            confidence,
            bullish: bullish.0,
            bearish: bearish.0,
            neutral,
        }
    }

    /// True when there is nothing but neutral (or no) input.
    pub fn all_neutral(&self) -> bool {
        self.bullish == 0 && self.bearish == 0
    }
}

/// Everything a divergence policy may look at.
#[derive(Debug)]
pub struct AggregationInput<'a> {
    pub instrument: &'a Instrument,
    pub signals: &'a UpstreamSignals,
    pub consensus: &'a Consensus,
    pub allowed: &'a AllowedActions,
    pub position: &'a PositionSnapshot,
}

/// A policy's proposed trade, before it is clipped to the allowed quantities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub action: Action,
    pub quantity: u64,
    pub confidence: Decimal,
    pub rationale: String,
}

/// Decides how to act when analysts disagree with each other or with the position.
///
/// Implementations must be deterministic. A returned error is an aggregation fault
/// for the instrument.
pub trait DivergencePolicy: Send + Sync {
    fn name(&self) -> &str;

    fn propose(&self, input: &AggregationInput<'_>) -> Result<Proposal, String>;
}

/// The primary signal-to-action mapping: act on the weighted consensus.
///
/// | consensus | position      | action                          |
/// |-----------|---------------|---------------------------------|
/// | bullish   | short         | cover the short                 |
/// | bullish   | otherwise     | buy the allowed maximum         |
/// | bearish   | long          | sell the long                   |
/// | bearish   | otherwise     | short the allowed maximum       |
/// | neutral   | any           | hold                            |
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowConsensus;

impl DivergencePolicy for FollowConsensus {
    fn name(&self) -> &str {
        "follow_consensus"
    }

    fn propose(&self, input: &AggregationInput<'_>) -> Result<Proposal, String> {
        let consensus = input.consensus;
        let (action, quantity) = match consensus.stance {
            Stance::Bullish if input.position.short > 0 => (Action::Cover, input.allowed.cover),
            Stance::Bullish => (Action::Buy, input.allowed.buy),
            Stance::Bearish if input.position.long > 0 => (Action::Sell, input.allowed.sell),
            Stance::Bearish => (Action::Short, input.allowed.short),
            Stance::Neutral => (Action::Hold, 0),
        };
        Ok(Proposal {
            action,
            quantity,
            confidence: consensus.confidence,
            rationale: format!(
                "{} consensus ({} bullish, {} bearish, {} neutral)",
                consensus.stance, consensus.bullish, consensus.bearish, consensus.neutral
            ),
        })
    }
}

/// Produces the single decision per instrument from its upstream signals.
#[derive(Clone)]
pub struct Aggregator {
    policy: Arc<dyn DivergencePolicy>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator").field("policy", &self.policy.name()).finish()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Arc::new(FollowConsensus))
    }
}

impl Aggregator {
    pub fn new(policy: Arc<dyn DivergencePolicy>) -> Self {
        Self { policy }
    }

    pub fn decide(
        &self,
        instrument: &Instrument,
        signals: &UpstreamSignals,
        risk: &RiskAssessment,
        portfolio: &PortfolioSnapshot,
        settings: &AggregatorSettings,
    ) -> Result<Decision, String> {
        let position = portfolio.position(instrument);
        let allowed = AllowedActions::compute(risk, &position, portfolio, settings);
        let contributors: Vec<String> = signals.iter().map(|(id, _)| id.clone()).collect();

        if allowed.only_hold() {
            let mut decision = Decision::hold(instrument.clone(), Decimal::ONE_HUNDRED, "No valid trade available");
            decision.contributors = contributors;
            return Ok(decision);
        }

        let consensus = Consensus::from_signals(signals);
        let proposal = self.policy.propose(&AggregationInput {
            instrument,
            signals,
            consensus: &consensus,
            allowed: &allowed,
            position: &position,
        })?;

        // Neutral input always means hold, whatever the policy proposed.
        if consensus.all_neutral() {
            let mut decision = Decision::hold(
                instrument.clone(),
                proposal.confidence,
                format!("All analysts neutral; holding. {}", proposal.rationale),
            );
            decision.contributors = contributors;
            return Ok(decision);
        }

        let quantity = proposal.quantity.min(allowed.limit(proposal.action));
        let (action, quantity) = if quantity == 0 {
            (Action::Hold, 0)
        } else {
            (proposal.action, quantity)
        };
        let rationale = if action == proposal.action {
            proposal.rationale
        } else {
            format!("{}; {} not possible, holding", proposal.rationale, proposal.action)
        };

        Ok(Decision {
            instrument: instrument.clone(),
            action,
            quantity,
            confidence: proposal.confidence.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED),
            rationale,
            contributors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_types::{Market, SignalResult};
    use rust_decimal_macros::dec;

    fn aaa() -> Instrument {
        Instrument::new("AAA", Market::Us)
    }

    fn signal(source: &str, stance: Stance, confidence: Decimal) -> (String, SignalResult) {
        (
            source.to_string(),
            SignalResult::new(source, stance, confidence, "", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
        )
    }

    fn priced(price: Decimal, max_shares: u64) -> RiskAssessment {
        RiskAssessment {
            current_price: Some(price),
            max_shares,
            ..RiskAssessment::unpriced("")
        }
    }

    #[test]
    fn bullish_consensus_buys_the_allowed_maximum() {
        let signals: UpstreamSignals = [signal("a", Stance::Bullish, dec!(80))].into_iter().collect();
        let portfolio = PortfolioSnapshot::with_cash(dec!(1000), dec!(0.5));
        let decision = Aggregator::default()
            .decide(&aaa(), &signals, &priced(dec!(20), 50), &portfolio, &AggregatorSettings::default())
            .unwrap();

        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.quantity, 50);
        assert_eq!(decision.confidence, dec!(80));
        assert_eq!(decision.contributors, vec!["a".to_string()]);
    }

    #[test]
    fn weighted_confidence_decides_mixed_views() {
        let signals: UpstreamSignals = [
            signal("a", Stance::Bullish, dec!(30)),
            signal("b", Stance::Bullish, dec!(30)),
            signal("c", Stance::Bearish, dec!(90)),
        ]
        .into_iter()
        .collect();
        let consensus = Consensus::from_signals(&signals);
        assert_eq!(consensus.stance, Stance::Bearish);
        assert_eq!(consensus.confidence, dec!(90));
    }

    #[test]
    fn bearish_on_a_long_position_sells_it() {
        let signals: UpstreamSignals = [signal("a", Stance::Bearish, dec!(70))].into_iter().collect();
        let mut portfolio = PortfolioSnapshot::with_cash(dec!(1000), dec!(0.5));
        portfolio.positions.insert(
            aaa(),
            PositionSnapshot {
                long: 12,
                ..Default::default()
            },
        );
        let decision = Aggregator::default()
            .decide(&aaa(), &signals, &priced(dec!(20), 10), &portfolio, &AggregatorSettings::default())
            .unwrap();
        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.quantity, 12);
    }

    #[test]
    fn bearish_without_shorting_holds() {
        let signals: UpstreamSignals = [signal("a", Stance::Bearish, dec!(70))].into_iter().collect();
        let portfolio = PortfolioSnapshot::with_cash(dec!(1000), dec!(0.5));
        let settings = AggregatorSettings { allow_short: false };
        let decision = Aggregator::default()
            .decide(&aaa(), &signals, &priced(dec!(20), 10), &portfolio, &settings)
            .unwrap();
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.quantity, 0);
    }

    #[test]
    fn neutral_signals_always_hold() {
        let signals: UpstreamSignals = [
            signal("a", Stance::Neutral, dec!(0)),
            signal("b", Stance::Neutral, dec!(55)),
        ]
        .into_iter()
        .collect();
        let portfolio = PortfolioSnapshot::with_cash(dec!(1000), dec!(0.5));
        let decision = Aggregator::default()
            .decide(&aaa(), &signals, &priced(dec!(20), 10), &portfolio, &AggregatorSettings::default())
            .unwrap();
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.quantity, 0);
    }

    #[test]
    fn no_price_short_circuits_to_hold() {
        let signals: UpstreamSignals = [signal("a", Stance::Bullish, dec!(90))].into_iter().collect();
        let portfolio = PortfolioSnapshot::with_cash(dec!(1000), dec!(0.5));
        let decision = Aggregator::default()
            .decide(&aaa(), &signals, &RiskAssessment::unpriced("none"), &portfolio, &AggregatorSettings::default())
            .unwrap();
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, dec!(100));
        assert_eq!(decision.rationale, "No valid trade available");
    }

    #[test]
    fn short_is_capped_by_margin() {
        let risk = priced(dec!(10), 1_000);
        let mut portfolio = PortfolioSnapshot::with_cash(dec!(100), dec!(0.5));
        portfolio.margin_used = dec!(150);
        let allowed = AllowedActions::compute(&risk, &PositionSnapshot::default(), &portfolio, &AggregatorSettings::default());
        // 100 / 0.5 - 150 = 50 of margin headroom
        assert_eq!(allowed.short, 5);
        assert_eq!(allowed.buy, 10);
    }

    struct Contrarian;

    impl DivergencePolicy for Contrarian {
        fn name(&self) -> &str {
            "contrarian"
        }

        fn propose(&self, input: &AggregationInput<'_>) -> Result<Proposal, String> {
            Ok(Proposal {
                action: Action::Short,
                quantity: u64::MAX,
                confidence: input.consensus.confidence,
                rationale: "fade the crowd".to_string(),
            })
        }
    }

    #[test]
    fn policy_proposals_are_clipped_to_allowed_quantities() {
        let signals: UpstreamSignals = [signal("a", Stance::Bullish, dec!(60))].into_iter().collect();
        let portfolio = PortfolioSnapshot::with_cash(dec!(1000), dec!(0.5));
        let decision = Aggregator::new(Arc::new(Contrarian))
            .decide(&aaa(), &signals, &priced(dec!(20), 7), &portfolio, &AggregatorSettings::default())
            .unwrap();
        assert_eq!(decision.action, Action::Short);
        assert_eq!(decision.quantity, 7);
    }
}
