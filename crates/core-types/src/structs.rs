use crate::enums::{DataDomain, Market};
use crate::error::CoreError;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A tradable security: its market-specific code plus the market it lists on.
///
/// Fields are private so an `Instrument` cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument {
    symbol: String,
    market: Market,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, market: Market) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            market,
        }
    }

    /// Builds an instrument from a bare ticker, inferring the market from its shape.
    ///
    /// - `.SH` / `.SZ` suffix, or a bare 6-digit code: A-share
    /// - `.HK` suffix, or a bare 4-5 digit code: Hong Kong
    /// - anything else: US
    pub fn parse(ticker: &str) -> Result<Self, CoreError> {
        let symbol = ticker.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(CoreError::InvalidInput(
                "ticker".to_string(),
                "ticker must not be empty".to_string(),
            ));
        }

        let market = if symbol.ends_with(".SH") || symbol.ends_with(".SZ") {
            Market::AShare
        } else if symbol.ends_with(".HK") {
            Market::HongKong
        } else if symbol.chars().all(|c| c.is_ascii_digit()) {
            match symbol.len() {
                6 => Market::AShare,
                4 | 5 => Market::HongKong,
                _ => {
                    return Err(CoreError::InvalidInput(
                        "ticker".to_string(),
                        format!("numeric code '{}' matches no known market", symbol),
                    ));
                }
            }
        } else {
            Market::Us
        };

        Ok(Self { symbol, market })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn market(&self) -> Market {
        self.market
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// The window of `days` calendar days ending on (and including) `as_of`.
    ///
    /// Fails when the window would start before the earliest representable date.
    pub fn lookback(as_of: NaiveDate, days: u32) -> Result<Self, CoreError> {
        let start = as_of
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| {
                CoreError::InvalidInput(
                    "lookback_days".to_string(),
                    format!("{} days before {} is out of range", days, as_of),
                )
            })?;
        Ok(Self { start, end: as_of })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// The fields requested from one data domain. An empty field list means "everything the
/// domain offers".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSet {
    pub domain: DataDomain,
    pub fields: BTreeSet<String>,
}

impl FieldSet {
    pub fn new<I, S>(domain: DataDomain, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domain,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn all(domain: DataDomain) -> Self {
        Self {
            domain,
            fields: BTreeSet::new(),
        }
    }
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            write!(f, "{}[*]", self.domain)
        } else {
            let joined: Vec<&str> = self.fields.iter().map(String::as_str).collect();
            write!(f, "{}[{}]", self.domain, joined.join(","))
        }
    }
}

/// A read-only view of one instrument's holdings, handed to the risk evaluator and
/// the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub long: u64,
    pub short: u64,
    /// Average cost per share of the long leg.
    pub long_cost_basis: Decimal,
    /// Average price per share at which the short leg was opened.
    pub short_cost_basis: Decimal,
}

/// A read-only view of the whole portfolio at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioSnapshot {
    pub cash: Decimal,
    /// Total portfolio value at the last mark-to-market.
    pub equity: Decimal,
    /// Fraction of short notional that must be posted as collateral.
    pub margin_requirement: Decimal,
    pub margin_used: Decimal,
    pub positions: BTreeMap<Instrument, PositionSnapshot>,
}

impl PortfolioSnapshot {
    /// A flat portfolio holding only cash.
    pub fn with_cash(cash: Decimal, margin_requirement: Decimal) -> Self {
        Self {
            cash,
            equity: cash,
            margin_requirement,
            margin_used: Decimal::ZERO,
            positions: BTreeMap::new(),
        }
    }

    pub fn position(&self, instrument: &Instrument) -> PositionSnapshot {
        self.positions.get(instrument).cloned().unwrap_or_default()
    }
}
