use crate::error::PortfolioError;
use core_types::{Action, Decision, Instrument, PortfolioSnapshot, PositionSnapshot};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Long and short holdings of one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub long: u64,
    pub short: u64,
    pub long_cost_basis: Decimal,
    pub short_cost_basis: Decimal,
    /// Collateral currently locked against the short leg.
    pub short_margin_used: Decimal,
}

impl Position {
    fn is_flat(&self) -> bool {
        self.long == 0 && self.short == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizedGains {
    pub long: Decimal,
    pub short: Decimal,
}

/// The result of applying one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub instrument: Instrument,
    pub action: Action,
    pub requested: u64,
    /// Shares actually traded after clipping. Zero for a hold.
    pub filled: u64,
    pub price: Decimal,
}

impl Fill {
    pub fn was_clipped(&self) -> bool {
        self.filled < self.requested
    }
}

fn whole_shares(value: Decimal) -> u64 {
    value.floor().to_u64().unwrap_or(0)
}

/// Manages the state of a simulated account: cash, positions, short margin and realized gains.
/// Its sole responsibility is to accurately reflect the state produced by applied decisions.
#[derive(Debug, Clone)]
pub struct Portfolio {
    cash: Decimal,
    margin_requirement: Decimal,
    margin_used: Decimal,
    positions: BTreeMap<Instrument, Position>,
    realized_gains: BTreeMap<Instrument, RealizedGains>,
}

impl Portfolio {
    /// Creates a new `Portfolio` with a given amount of starting capital.
    pub fn new(initial_capital: Decimal, margin_requirement: Decimal) -> Result<Self, PortfolioError> {
        if initial_capital < Decimal::ZERO {
            return Err(PortfolioError::InvalidParameters(format!(
                "initial capital must not be negative, got {}",
                initial_capital
            )));
        }
        if margin_requirement <= Decimal::ZERO || margin_requirement > Decimal::ONE {
            return Err(PortfolioError::InvalidParameters(format!(
                "margin requirement must be in (0, 1], got {}",
                margin_requirement
            )));
        }
        Ok(Self {
            cash: initial_capital,
            margin_requirement,
            margin_used: Decimal::ZERO,
            positions: BTreeMap::new(),
            realized_gains: BTreeMap::new(),
        })
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn margin_used(&self) -> Decimal {
        self.margin_used
    }

    pub fn position(&self, instrument: &Instrument) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn realized_gains(&self, instrument: &Instrument) -> RealizedGains {
        self.realized_gains.get(instrument).copied().unwrap_or_default()
    }

    pub fn total_realized_gains(&self) -> Decimal {
        self.realized_gains.values().map(|g| g.long + g.short).sum()
    }

    /// Applies a decision at `price`, clipping the quantity to what cash, margin or
    /// the held position allows. This is the core state transition logic.
    pub fn apply(&mut self, decision: &Decision, price: Decimal) -> Result<Fill, PortfolioError> {
        let instrument = &decision.instrument;
        if decision.action != Action::Hold && price <= Decimal::ZERO {
            return Err(PortfolioError::InvalidPrice {
                symbol: instrument.to_string(),
                price,
            });
        }

        let requested = decision.quantity;
        let filled = match decision.action {
            Action::Hold => 0,
            Action::Buy => self.buy(instrument, requested, price),
            Action::Sell => self.sell(instrument, requested, price),
            Action::Short => self.short(instrument, requested, price),
            Action::Cover => self.cover(instrument, requested, price),
        };

        if self.positions.get(instrument).is_some_and(Position::is_flat) {
            self.positions.remove(instrument);
        }

        let fill = Fill {
            instrument: instrument.clone(),
            action: decision.action,
            requested,
            filled,
            price,
        };
        if fill.was_clipped() {
            tracing::debug!(
                instrument = %fill.instrument,
                action = %fill.action,
                requested,
                filled,
                cash = %self.cash,
                "Order clipped to available cash, margin or position."
            );
        }
        Ok(fill)
    }

    fn buy(&mut self, instrument: &Instrument, requested: u64, price: Decimal) -> u64 {
        let quantity = requested.min(whole_shares(self.cash / price));
        if quantity == 0 {
            return 0;
        }
        let cost = Decimal::from(quantity) * price;
        let position = self.positions.entry(instrument.clone()).or_default();
        let existing = position.long_cost_basis * Decimal::from(position.long);
        position.long += quantity;
        position.long_cost_basis = (existing + cost) / Decimal::from(position.long);
        self.cash -= cost;
        quantity
    }

    fn sell(&mut self, instrument: &Instrument, requested: u64, price: Decimal) -> u64 {
        let Some(position) = self.positions.get_mut(instrument) else {
            return 0;
        };
        let quantity = requested.min(position.long);
        if quantity == 0 {
            return 0;
        }
        let shares = Decimal::from(quantity);
        let gain = (price - position.long_cost_basis) * shares;
        position.long -= quantity;
        if position.long == 0 {
            position.long_cost_basis = Decimal::ZERO;
        }
        self.cash += shares * price;
        self.realized_gains.entry(instrument.clone()).or_default().long += gain;
        quantity
    }

    /// Opening a short credits the proceeds and locks `margin_requirement` of them as
    /// collateral; the quantity is clipped to what cash can collateralize.
    fn short(&mut self, instrument: &Instrument, requested: u64, price: Decimal) -> u64 {
        let margin_per_share = price * self.margin_requirement;
        let quantity = requested.min(whole_shares(self.cash / margin_per_share));
        if quantity == 0 {
            return 0;
        }
        let shares = Decimal::from(quantity);
        let proceeds = shares * price;
        let margin = shares * margin_per_share;

        let position = self.positions.entry(instrument.clone()).or_default();
        let existing = position.short_cost_basis * Decimal::from(position.short);
        position.short += quantity;
        position.short_cost_basis = (existing + proceeds) / Decimal::from(position.short);
        position.short_margin_used += margin;

        self.margin_used += margin;
        self.cash += proceeds - margin;
        quantity
    }

    /// Covering releases collateral in proportion to the shares bought back. After an
    /// adverse move the quantity is clipped so cash stays non-negative.
    fn cover(&mut self, instrument: &Instrument, requested: u64, price: Decimal) -> u64 {
        let Some(position) = self.positions.get_mut(instrument) else {
            return 0;
        };
        let mut quantity = requested.min(position.short);
        if quantity == 0 {
            return 0;
        }
        let release_per_share = position.short_margin_used / Decimal::from(position.short);
        if price > release_per_share {
            quantity = quantity.min(whole_shares(self.cash / (price - release_per_share)));
            if quantity == 0 {
                return 0;
            }
        }

        let shares = Decimal::from(quantity);
        let release = if quantity == position.short {
            position.short_margin_used
        } else {
            release_per_share * shares
        };
        let gain = (position.short_cost_basis - price) * shares;

        position.short -= quantity;
        position.short_margin_used -= release;
        if position.short == 0 {
            position.short_cost_basis = Decimal::ZERO;
        }

        self.margin_used -= release;
        self.cash += release - shares * price;
        self.realized_gains.entry(instrument.clone()).or_default().short += gain;
        quantity
    }

    /// Total value at the given prices: cash, locked margin, long value, minus the
    /// cost of buying back every short.
    pub fn calculate_total_equity(
        &self,
        market_prices: &BTreeMap<Instrument, Decimal>,
    ) -> Result<Decimal, PortfolioError> {
        let mut total = self.cash + self.margin_used;
        for (instrument, position) in &self.positions {
            let price = market_prices
                .get(instrument)
                .ok_or_else(|| PortfolioError::MissingPrice(instrument.to_string()))?;
            total += Decimal::from(position.long) * price;
            total -= Decimal::from(position.short) * price;
        }
        Ok(total)
    }

    /// A read-only view of the portfolio, valued at `equity`.
    pub fn snapshot(&self, equity: Decimal) -> PortfolioSnapshot {
        PortfolioSnapshot {
            cash: self.cash,
            equity,
            margin_requirement: self.margin_requirement,
            margin_used: self.margin_used,
            positions: self
                .positions
                .iter()
                .map(|(instrument, p)| {
                    (
                        instrument.clone(),
                        PositionSnapshot {
                            long: p.long,
                            short: p.short,
                            long_cost_basis: p.long_cost_basis,
                            short_cost_basis: p.short_cost_basis,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Instrument, Market};
    use rust_decimal_macros::dec;

    fn aaa() -> Instrument {
        Instrument::new("AAA", Market::Us)
    }

    fn decision(action: Action, quantity: u64) -> Decision {
        Decision {
            instrument: aaa(),
            action,
            quantity,
            confidence: dec!(80),
            rationale: String::new(),
            contributors: Vec::new(),
        }
    }

    fn prices(price: Decimal) -> BTreeMap<Instrument, Decimal> {
        BTreeMap::from([(aaa(), price)])
    }

    #[test]
    fn buy_is_clipped_to_cash() {
        let mut portfolio = Portfolio::new(dec!(500), dec!(0.5)).unwrap();
        let fill = portfolio.apply(&decision(Action::Buy, 100), dec!(10)).unwrap();

        assert_eq!(fill.filled, 50);
        assert!(fill.was_clipped());
        assert_eq!(portfolio.cash(), dec!(0));
        assert_eq!(portfolio.position(&aaa()).unwrap().long, 50);
        assert_eq!(portfolio.position(&aaa()).unwrap().long_cost_basis, dec!(10));
    }

    #[test]
    fn sell_never_goes_below_zero_and_books_gains() {
        let mut portfolio = Portfolio::new(dec!(1000), dec!(0.5)).unwrap();
        portfolio.apply(&decision(Action::Buy, 10), dec!(10)).unwrap();
        let fill = portfolio.apply(&decision(Action::Sell, 25), dec!(12)).unwrap();

        assert_eq!(fill.filled, 10);
        assert_eq!(portfolio.cash(), dec!(1020));
        assert!(portfolio.position(&aaa()).is_none());
        assert_eq!(portfolio.realized_gains(&aaa()).long, dec!(20));
    }

    #[test]
    fn short_locks_margin_and_preserves_equity() {
        let mut portfolio = Portfolio::new(dec!(1000), dec!(0.5)).unwrap();
        let fill = portfolio.apply(&decision(Action::Short, 10), dec!(20)).unwrap();

        assert_eq!(fill.filled, 10);
        assert_eq!(portfolio.margin_used(), dec!(100));
        assert_eq!(portfolio.cash(), dec!(1100));
        assert_eq!(portfolio.calculate_total_equity(&prices(dec!(20))).unwrap(), dec!(1000));
        assert_eq!(portfolio.calculate_total_equity(&prices(dec!(15))).unwrap(), dec!(1050));
    }

    #[test]
    fn short_is_clipped_to_available_margin() {
        let mut portfolio = Portfolio::new(dec!(100), dec!(0.5)).unwrap();
        let fill = portfolio.apply(&decision(Action::Short, 50), dec!(20)).unwrap();
        assert_eq!(fill.filled, 10);
        assert_eq!(portfolio.margin_used(), dec!(100));
    }

    #[test]
    fn cover_releases_margin_proportionally() {
        let mut portfolio = Portfolio::new(dec!(1000), dec!(0.5)).unwrap();
        portfolio.apply(&decision(Action::Short, 10), dec!(20)).unwrap();
        let fill = portfolio.apply(&decision(Action::Cover, 4), dec!(15)).unwrap();

        assert_eq!(fill.filled, 4);
        assert_eq!(portfolio.margin_used(), dec!(60));
        // 1100 + 40 released - 60 paid
        assert_eq!(portfolio.cash(), dec!(1080));
        assert_eq!(portfolio.realized_gains(&aaa()).short, dec!(20));
        assert_eq!(portfolio.position(&aaa()).unwrap().short, 6);
    }

    #[test]
    fn cover_after_adverse_move_keeps_cash_non_negative() {
        let mut portfolio = Portfolio::new(dec!(100), dec!(0.5)).unwrap();
        portfolio.apply(&decision(Action::Short, 10), dec!(20)).unwrap();
        // Cash 200, margin 100. Buying back at 50 costs 40 net per share.
        let fill = portfolio.apply(&decision(Action::Cover, 10), dec!(50)).unwrap();

        assert_eq!(fill.filled, 5);
        assert_eq!(portfolio.cash(), dec!(0));
        assert_eq!(portfolio.margin_used(), dec!(50));
    }

    #[test]
    fn hold_changes_nothing() {
        let mut portfolio = Portfolio::new(dec!(1000), dec!(0.5)).unwrap();
        let fill = portfolio.apply(&decision(Action::Hold, 0), dec!(0)).unwrap();
        assert_eq!(fill.filled, 0);
        assert_eq!(portfolio.cash(), dec!(1000));
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let mut portfolio = Portfolio::new(dec!(1000), dec!(0.5)).unwrap();
        let err = portfolio.apply(&decision(Action::Buy, 1), dec!(0)).unwrap_err();
        assert!(matches!(err, PortfolioError::InvalidPrice { .. }));
    }

    #[test]
    fn equity_requires_a_price_for_every_position() {
        let mut portfolio = Portfolio::new(dec!(1000), dec!(0.5)).unwrap();
        portfolio.apply(&decision(Action::Buy, 1), dec!(10)).unwrap();
        let err = portfolio.calculate_total_equity(&BTreeMap::new()).unwrap_err();
        assert_eq!(err, PortfolioError::MissingPrice("AAA".to_string()));
    }

    #[test]
    fn same_symbol_in_two_markets_is_two_positions() {
        let mut portfolio = Portfolio::new(dec!(1000), dec!(0.5)).unwrap();
        let listed_in_hk = Instrument::new("AAA", Market::HongKong);
        portfolio.apply(&decision(Action::Buy, 3), dec!(10)).unwrap();
        let mut hk_buy = decision(Action::Buy, 7);
        hk_buy.instrument = listed_in_hk.clone();
        portfolio.apply(&hk_buy, dec!(20)).unwrap();

        assert_eq!(portfolio.position(&aaa()).unwrap().long, 3);
        assert_eq!(portfolio.position(&listed_in_hk).unwrap().long, 7);
        assert_eq!(portfolio.snapshot(dec!(1000)).positions.len(), 2);

        let prices = BTreeMap::from([(aaa(), dec!(10)), (listed_in_hk, dec!(20))]);
        assert_eq!(portfolio.calculate_total_equity(&prices).unwrap(), dec!(1000));
    }

    #[test]
    fn snapshot_mirrors_positions() {
        let mut portfolio = Portfolio::new(dec!(1000), dec!(0.5)).unwrap();
        portfolio.apply(&decision(Action::Buy, 5), dec!(10)).unwrap();
        let snapshot = portfolio.snapshot(dec!(1000));
        assert_eq!(snapshot.cash, dec!(950));
        assert_eq!(snapshot.position(&aaa()).long, 5);
        assert_eq!(snapshot.position(&Instrument::new("BBB", Market::Us)), PositionSnapshot::default());
    }
}
