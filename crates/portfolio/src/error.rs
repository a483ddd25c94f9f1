use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    #[error("Cannot trade {symbol} at a non-positive price ({price}).")]
    InvalidPrice { symbol: String, price: Decimal },

    #[error("Missing market price for symbol: {0}")]
    MissingPrice(String),

    #[error("Invalid portfolio parameters: {0}")]
    InvalidParameters(String),
}
