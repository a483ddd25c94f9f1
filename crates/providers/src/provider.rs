use crate::error::ProviderFault;
use async_trait::async_trait;
use core_types::{DataDomain, DataSet, DateRange, FieldSet, Instrument, Market};

/// The generic, abstract interface for a market data vendor.
/// This trait is the contract the provider chain uses, allowing the
/// underlying implementation (live or fake) to be swapped out.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Stable name used in logs and in `DataUnavailable` reports.
    fn name(&self) -> &str;

    /// Whether this provider can serve `domain` data for instruments of `market`.
    fn covers(&self, market: Market, domain: DataDomain) -> bool;

    /// Fetches the records of `fields.domain` for `instrument` within `range`.
    ///
    /// One call is one attempt: implementations must not retry internally.
    async fn fetch(
        &self,
        instrument: &Instrument,
        fields: &FieldSet,
        range: &DateRange,
    ) -> Result<DataSet, ProviderFault>;
}
