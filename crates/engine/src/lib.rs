//! # Quorum Engine
//!
//! Schedules analysts, the risk node and the aggregator over an execution graph for
//! every instrument of a run, and turns their signals into one decision per instrument.
//!
//! ## Architectural Principles
//!
//! - **Dataflow:** a node starts as soon as every node it declared as upstream has
//!   resolved, and it sees only those nodes' outputs. Independent nodes run concurrently.
//! - **Isolation:** each instrument runs as its own task. A fault in one instrument's
//!   pipeline is recorded in its outcome and never touches another instrument.
//! - **Graceful degradation:** an analyst whose data is unavailable contributes a
//!   neutral signal instead of failing the pipeline.
//! - **Memoization:** analyst results go through the shared `SignalCache`, so repeated
//!   runs over the same inputs never recompute a signal.
//!
//! ## Public API
//!
//! - `ExecutionGraph`, `ExecutionNode`: the validated, frozen graph of nodes.
//! - `Orchestrator`: runs a `RunRequest` in place (`run`) or in the background
//!   (`submit_run`, returning a `RunHandle`).
//! - `Aggregator`, `DivergencePolicy`: how signals become a `Decision`.

pub mod aggregator;
pub mod builder;
pub mod error;
pub mod graph;
pub mod handle;
pub mod orchestrator;

// Re-export the key components to create a clean, public-facing API.
pub use aggregator::{
    AggregationInput, Aggregator, AllowedActions, Consensus, DivergencePolicy, FollowConsensus, Proposal,
};
pub use builder::{cache_from_config, graph_from_config};
pub use error::{EngineError, GraphError};
pub use graph::{AGGREGATOR_NODE_ID, ExecutionGraph, ExecutionNode, NodeRole, RISK_NODE_ID};
pub use handle::RunHandle;
pub use orchestrator::{InstrumentOutcome, NodeFault, Orchestrator, RunOutcome, RunRequest};
