use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalystError {
    /// The analyst cannot form a view because the data it needs is missing.
    /// The orchestrator recovers from this by substituting a neutral signal.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Analyst received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),
}
