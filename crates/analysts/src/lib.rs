//! # Quorum Analysts
//!
//! The analysis units of the execution graph. Each analyst turns a time-bounded
//! `DataSet` into a `SignalResult` (stance, confidence, rationale).
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of providers,
//!   caches or scheduling. It depends only on `core-types`.
//! - **Analyst Agnostic Engine:** By using the `SignalProducer` trait, the orchestrator
//!   can run any analyst without knowing its internal details.
//! - **Extensibility:** Adding an analyst means creating a module, implementing
//!   `SignalProducer`, and adding it to the `AnalystId` enum and `factory`.
//!
//! ## Public API
//!
//! - `SignalProducer`: The core trait all analysts implement.
//! - `DataRequirements`, `UpstreamSignals`, `EvaluationContext`: its inputs.
//! - `create_analyst`: The factory function to construct an analyst instance.
//! - The concrete analysts: `Technicals`, `Fundamentals`, `Sentiment`.

// Declare all the modules that constitute this crate.
pub mod error;
pub mod factory;
pub mod fundamentals;
pub mod params;
pub mod producer;
pub mod sentiment;
pub mod technicals;

// Re-export the key components to create a clean, public-facing API.
pub use core_types::AnalystId;
pub use error::AnalystError;
pub use factory::create_analyst;
pub use fundamentals::Fundamentals;
pub use params::ParamMap;
pub use producer::{DataRequirements, EvaluationContext, SignalProducer, UpstreamSignals};
pub use sentiment::Sentiment;
pub use technicals::Technicals;
