use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache's bookkeeping is inconsistent, or a spill file could not be parsed.
    /// Never recovered from: results served from a corrupt cache cannot be trusted.
    #[error("Signal cache corrupted: {0}")]
    Corruption(String),

    #[error("Signal cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize signal cache: {0}")]
    Serialization(#[from] serde_json::Error),
}
