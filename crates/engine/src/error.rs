use core_types::Instrument;
use thiserror::Error;

/// Errors raised while building or validating the execution graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node '{0}' is already registered.")]
    Duplicate(String),

    #[error("Registering '{node}' would create a cycle: {}", .path.join(" -> "))]
    Cycle { node: String, path: Vec<String> },

    #[error("Node '{node}' depends on unregistered node '{upstream}'.")]
    Dangling { node: String, upstream: String },

    #[error("The graph is frozen; nodes cannot be registered after scheduling has begun.")]
    Frozen,

    #[error("The graph needs exactly one aggregator node, found {0}.")]
    AggregatorCount(usize),

    #[error("The graph needs exactly one risk node, found {0}.")]
    RiskCount(usize),

    #[error("The aggregator '{aggregator}' must be a sink, but '{downstream}' depends on it.")]
    AggregatorNotSink { aggregator: String, downstream: String },

    #[error("The aggregator '{0}' must list the risk node as upstream.")]
    MissingRiskInput(String),

    #[error("Node '{node}' cannot consume '{upstream}': {reason}")]
    InvalidEdge {
        node: String,
        upstream: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Aggregation failed for {instrument}: {reason}")]
    Aggregation { instrument: Instrument, reason: String },

    #[error("Signal cache error: {0}")]
    Cache(#[from] signal_cache::CacheError),

    #[error("Provider setup error: {0}")]
    Provider(#[from] providers::ProviderError),

    #[error("Analyst setup error: {0}")]
    Analyst(#[from] analysts::AnalystError),

    #[error("The run was cancelled.")]
    Cancelled,

    #[error("A run task panicked: {0}")]
    TaskPanicked(String),
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            EngineError::Cancelled
        } else {
            EngineError::TaskPanicked(err.to_string())
        }
    }
}
