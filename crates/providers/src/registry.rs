use crate::chain::ProviderChain;
use crate::error::ProviderError;
use crate::provider::DataProvider;
use crate::rest::RestProvider;
use crate::retry::RetryPolicy;
use configuration::Config;
use core_types::{DataDomain, DataSet, DateRange, FieldSet, Instrument, Market};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps every (market, domain) pair to the chain that serves it.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    chains: HashMap<(Market, DataDomain), Arc<ProviderChain>>,
}

impl ProviderRegistry {
    /// Builds one chain per (market, domain) pair covered by at least one provider.
    pub fn from_providers(
        providers: Vec<(u32, Arc<dyn DataProvider>)>,
        policy: RetryPolicy,
    ) -> Result<Self, ProviderError> {
        let mut chains = HashMap::new();
        for market in Market::ALL {
            for domain in DataDomain::ALL {
                let members: Vec<(u32, Arc<dyn DataProvider>)> = providers
                    .iter()
                    .filter(|(_, p)| p.covers(market, domain))
                    .map(|(priority, p)| (*priority, Arc::clone(p)))
                    .collect();
                if members.is_empty() {
                    continue;
                }
                let chain = ProviderChain::new(market, domain, members, policy.clone())?;
                tracing::debug!(market = %market, domain = %domain, providers = ?chain.provider_names(), "Provider chain built.");
                chains.insert((market, domain), Arc::new(chain));
            }
        }

        if chains.is_empty() {
            return Err(ProviderError::Configuration(
                "no provider covers any market".to_string(),
            ));
        }
        Ok(Self { chains })
    }

    /// Builds REST providers from the `[[providers]]` table.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let mut providers: Vec<(u32, Arc<dyn DataProvider>)> = Vec::with_capacity(config.providers.len());
        for settings in &config.providers {
            let provider = RestProvider::from_settings(settings)?;
            providers.push((settings.priority, Arc::new(provider)));
        }
        Self::from_providers(providers, RetryPolicy::from_settings(&config.retry))
    }

    pub fn chain(&self, market: Market, domain: DataDomain) -> Option<Arc<ProviderChain>> {
        self.chains.get(&(market, domain)).cloned()
    }

    /// Routes a fetch to the chain selected by the instrument's market.
    pub async fn fetch(
        &self,
        instrument: &Instrument,
        fields: &FieldSet,
        range: &DateRange,
    ) -> Result<DataSet, ProviderError> {
        let chain = self
            .chain(instrument.market(), fields.domain)
            .ok_or(ProviderError::NoChain {
                market: instrument.market(),
                domain: fields.domain,
            })?;
        chain.fetch(instrument, fields, range).await
    }
}
