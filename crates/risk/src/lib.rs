//! # Quorum Risk Crate
//!
//! Turns a price history and a portfolio snapshot into per-instrument position
//! limits. The assessment is the only input the aggregator trusts for the
//! current price and the maximum tradable size.
//!
//! ## Public API
//!
//! - `RiskEvaluator`: The trait the engine's risk node calls.
//! - `VolatilityAdjustedLimits`: Caps each position at a fraction of equity,
//!   scaled down as annualised volatility rises.
//! - `RiskAssessment`: The evaluator's output.
//! - `RiskError`: The error type for this crate.

pub mod error;
pub mod limits;

// Re-export key types to create a clean public API.
pub use error::RiskError;
pub use limits::{RiskAssessment, VolatilityAdjustedLimits};

use chrono::NaiveDate;
use core_types::{Instrument, PortfolioSnapshot, PriceBar};

/// The core trait for risk evaluation.
///
/// Implementations must be pure: the same prices and snapshot always give the same
/// assessment, which keeps decisions reproducible.
pub trait RiskEvaluator: Send + Sync {
    fn assess(
        &self,
        instrument: &Instrument,
        prices: &[PriceBar],
        as_of: NaiveDate,
        portfolio: &PortfolioSnapshot,
    ) -> Result<RiskAssessment, RiskError>;
}
