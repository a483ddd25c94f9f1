//! # Quorum Analytics Engine
//!
//! This crate turns the valuation series of a backtest into performance metrics.
//! It acts as the "unbiased judge" of the system.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of external systems.
//!   It depends only on `core-types` (Layer 0).
//! - **Stateless Calculation:** The `AnalyticsEngine` is a stateless calculator. It takes
//!   a `SessionRecord` as input and produces a `PerformanceReport` as output.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: The main struct that contains the calculation logic.
//! - `SessionRecord`: Everything a backtest collected, handed to the engine.
//! - `PerformanceReport`: Return series, cumulative return, drawdown and ratios.
//! - `AnalyticsError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod engine;
pub mod error;
pub mod report;

// Re-export the key components to create a clean, public-facing API.
pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use report::{DailyReturn, FaultRecord, PerformanceReport, SessionRecord, ValuationPoint};
