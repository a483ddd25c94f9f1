use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    /// The backtest cannot start, e.g. an empty date sequence or no instruments.
    #[error("Backtest configuration error: {0}")]
    Configuration(String),

    #[error("Orchestration error: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("Portfolio error: {0}")]
    Portfolio(#[from] portfolio::PortfolioError),

    #[error("Analytics calculation error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Failed to write the report artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize the report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),

    #[error("The backtest was cancelled.")]
    Cancelled,

    #[error("The backtest task panicked: {0}")]
    TaskPanicked(String),
}

impl From<indicatif::style::TemplateError> for BacktestError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        BacktestError::ProgressBarTemplate(error.to_string())
    }
}

impl From<tokio::task::JoinError> for BacktestError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            BacktestError::Cancelled
        } else {
            BacktestError::TaskPanicked(err.to_string())
        }
    }
}
