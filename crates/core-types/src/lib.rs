pub mod data;
pub mod enums;
pub mod error;
pub mod signals;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use data::{DataSet, FinancialMetrics, InsiderTrade, NewsItem, NewsSentiment, PriceBar};
pub use enums::{Action, AnalystId, DataDomain, Market, Stance};
pub use error::CoreError;
pub use signals::{Decision, SignalResult, MAX_CONFIDENCE};
pub use structs::{DateRange, FieldSet, Instrument, PortfolioSnapshot, PositionSnapshot};
