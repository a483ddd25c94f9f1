use serde::{Deserialize, Serialize};
use std::fmt;

/// The exchange family an instrument trades on. It decides which provider
/// chain is consulted for its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// Shanghai / Shenzhen listed A-shares.
    AShare,
    /// Hong Kong listed equities.
    HongKong,
    /// US listed equities.
    Us,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::AShare, Market::HongKong, Market::Us];
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Market::AShare => "a_share",
            Market::HongKong => "hong_kong",
            Market::Us => "us",
        };
        f.write_str(label)
    }
}

/// The qualitative view an analyst takes on an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Bullish,
    Neutral,
    Bearish,
}

impl Stance {
    /// Maps the stance onto -1 / 0 / +1 for weighted combinations.
    pub fn direction(&self) -> i8 {
        match self {
            Stance::Bullish => 1,
            Stance::Neutral => 0,
            Stance::Bearish => -1,
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stance::Bullish => "bullish",
            Stance::Neutral => "neutral",
            Stance::Bearish => "bearish",
        };
        f.write_str(label)
    }
}

/// The trading action carried by a `Decision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    Short,
    Cover,
    Hold,
}

impl Action {
    /// Returns true for actions that open or grow a position and therefore consume cash.
    pub fn consumes_cash(&self) -> bool {
        matches!(self, Action::Buy | Action::Short)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Short => "short",
            Action::Cover => "cover",
            Action::Hold => "hold",
        };
        f.write_str(label)
    }
}

/// The family of records a provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDomain {
    /// Daily OHLCV bars.
    Prices,
    /// Financial statements and derived metrics.
    Financials,
    /// Insider ownership changes and company news.
    Ownership,
}

impl DataDomain {
    pub const ALL: [DataDomain; 3] = [DataDomain::Prices, DataDomain::Financials, DataDomain::Ownership];
}

impl fmt::Display for DataDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DataDomain::Prices => "prices",
            DataDomain::Financials => "financials",
            DataDomain::Ownership => "ownership",
        };
        f.write_str(label)
    }
}

/// Stable identities of the analysts shipped with the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalystId {
    Technicals,
    Fundamentals,
    Sentiment,
}

impl AnalystId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalystId::Technicals => "technicals",
            AnalystId::Fundamentals => "fundamentals",
            AnalystId::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for AnalystId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
