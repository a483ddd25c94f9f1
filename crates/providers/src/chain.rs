use crate::attempt::{AttemptOutcome, ProviderAttempt};
use crate::error::{DataUnavailable, FaultKind, ProviderError, ProviderFault};
use crate::provider::DataProvider;
use crate::retry::RetryPolicy;
use core_types::{DataDomain, DataSet, DateRange, FieldSet, Instrument, Market};
use std::sync::Arc;
use tokio::time::{Instant, sleep, timeout};

/// An ordered list of providers serving one data domain for one market.
///
/// Providers are tried in ascending priority. Each gets up to `max_attempts`
/// attempts for retryable faults; a non-retryable fault moves on at once.
pub struct ProviderChain {
    market: Market,
    domain: DataDomain,
    providers: Vec<Arc<dyn DataProvider>>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("market", &self.market)
            .field("domain", &self.domain)
            .field("providers", &self.provider_names())
            .finish()
    }
}

impl ProviderChain {
    /// Builds a chain from `(priority, provider)` pairs. Ties keep their given order.
    ///
    /// Fails if the list is empty or a provider does not cover the chain's market and domain.
    pub fn new(
        market: Market,
        domain: DataDomain,
        mut providers: Vec<(u32, Arc<dyn DataProvider>)>,
        policy: RetryPolicy,
    ) -> Result<Self, ProviderError> {
        if providers.is_empty() {
            return Err(ProviderError::Configuration(format!(
                "the {} chain for {} has no providers",
                domain, market
            )));
        }
        if let Some((_, stray)) = providers.iter().find(|(_, p)| !p.covers(market, domain)) {
            return Err(ProviderError::Configuration(format!(
                "provider '{}' does not serve {} data for {}",
                stray.name(),
                domain,
                market
            )));
        }
        providers.sort_by_key(|(priority, _)| *priority);

        Ok(Self {
            market,
            domain,
            providers: providers.into_iter().map(|(_, p)| p).collect(),
            policy,
        })
    }

    pub fn market(&self) -> Market {
        self.market
    }

    pub fn domain(&self) -> DataDomain {
        self.domain
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Fetches data, failing over across providers.
    ///
    /// Each attempt is bounded by the per-attempt timeout and the whole call by the
    /// fetch timeout. Dropping the returned future cancels the in-flight provider call.
    pub async fn fetch(
        &self,
        instrument: &Instrument,
        fields: &FieldSet,
        range: &DateRange,
    ) -> Result<DataSet, ProviderError> {
        if instrument.market() != self.market || fields.domain != self.domain {
            return Err(ProviderError::OutOfCoverage {
                instrument: instrument.clone(),
                market: instrument.market(),
                chain_market: self.market,
                domain: fields.domain,
            });
        }

        let deadline = Instant::now() + self.policy.fetch_timeout;
        let mut last_attempts: Vec<ProviderAttempt> = Vec::with_capacity(self.providers.len());

        'providers: for provider in &self.providers {
            let mut last: Option<ProviderAttempt> = None;

            for attempt in 1..=self.policy.max_attempts {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    if let Some(a) = last.take() {
                        last_attempts.push(a);
                    }
                    tracing::warn!(instrument = %instrument, domain = %self.domain, "Fetch deadline exceeded.");
                    break 'providers;
                }

                let started = Instant::now();
                let result = match timeout(
                    self.policy.attempt_timeout.min(remaining),
                    provider.fetch(instrument, fields, range),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderFault::new(FaultKind::Timeout, "attempt timed out")),
                };
                let latency = started.elapsed();

                let fault = match result {
                    Ok(data) => {
                        tracing::debug!(
                            provider = provider.name(),
                            instrument = %instrument,
                            domain = %self.domain,
                            attempt,
                            latency_ms = latency.as_millis() as u64,
                            records = data.record_count(),
                            "Provider call succeeded."
                        );
                        return Ok(data);
                    }
                    Err(fault) => fault,
                };

                tracing::debug!(
                    provider = provider.name(),
                    instrument = %instrument,
                    attempt,
                    fault = %fault,
                    "Provider call failed."
                );
                let kind = fault.kind;
                last = Some(ProviderAttempt {
                    provider: provider.name().to_string(),
                    attempt,
                    outcome: AttemptOutcome::Failed(fault),
                    latency,
                });

                if !kind.is_retryable() || attempt == self.policy.max_attempts {
                    break;
                }

                let delay = self.policy.backoff(kind, attempt - 1);
                if Instant::now() + delay >= deadline {
                    break;
                }
                tracing::warn!(
                    provider = provider.name(),
                    instrument = %instrument,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying provider after {}.",
                    kind
                );
                sleep(delay).await;
            }

            if let Some(a) = last {
                last_attempts.push(a);
            }
        }

        Err(DataUnavailable {
            instrument: instrument.clone(),
            domain: self.domain,
            attempts: last_attempts,
        }
        .into())
    }
}
