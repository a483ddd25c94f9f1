//! # Quorum Events
//!
//! The progress-reporting vocabulary shared by the orchestrator, the backtest loop and
//! any observer that wants to follow a run while it executes.
//!
//! As a Layer 0 crate, it depends only on `core-types`.
//!
//! ## Public API
//! - `ProgressEvent` / `Phase`: one lifecycle transition of one node for one instrument.
//! - `EventPublisher`: the sink the orchestrator emits into. Publishing never blocks.
//! - `ChannelPublisher`, `StatusBoard`, `Fanout`, `NullPublisher`: stock sinks.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;
pub mod publisher;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{Phase, ProgressEvent};
pub use publisher::{ChannelPublisher, EventPublisher, Fanout, NullPublisher, StatusBoard};
