use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("Price bar for {symbol} on {date} has a non-positive close ({close}).")]
    InvalidPrice {
        symbol: String,
        date: chrono::NaiveDate,
        close: Decimal,
    },
}
