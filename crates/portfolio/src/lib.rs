//! # Quorum Portfolio Crate
//!
//! The in-memory state of a simulated account: cash, long and short positions,
//! cost basis, short margin and realized gains. The backtest loop is the only
//! writer; everything else sees a `PortfolioSnapshot`.
//!
//! ## Architectural Principles
//!
//! - **Clip, never reject:** An order larger than cash, margin or the held
//!   position is filled to what is possible. A decision is only refused for an
//!   invalid price.
//! - **Cash never goes negative:** Every branch of `Portfolio::apply` keeps that
//!   invariant, including covers after an adverse price move.
//!
//! ## Public API
//!
//! - `Portfolio`: The state machine.
//! - `Position`, `RealizedGains`: Per-instrument state.
//! - `Fill`: The effect of applying one decision.
//! - `PortfolioError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod error;
pub mod portfolio;

// Re-export the key components to provide a clean, public-facing API.
pub use error::PortfolioError;
pub use portfolio::{Fill, Portfolio, Position, RealizedGains};
