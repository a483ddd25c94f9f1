use crate::error::EngineError;
use crate::graph::ExecutionGraph;
use crate::orchestrator::Orchestrator;
use analysts::{SignalProducer, create_analyst};
use configuration::Config;
use providers::ProviderRegistry;
use signal_cache::SignalCache;
use std::sync::Arc;

/// Builds the standard graph from the enabled `[[analysts]]` entries.
pub fn graph_from_config(config: &Config) -> Result<ExecutionGraph, EngineError> {
    let mut analysts: Vec<(Arc<dyn SignalProducer>, Vec<String>)> = Vec::new();
    for settings in config.enabled_analysts() {
        let producer: Arc<dyn SignalProducer> = Arc::from(create_analyst(settings.id, &settings.params)?);
        tracing::debug!(analyst = producer.id(), upstream = ?settings.depends_on, "Analyst configured.");
        analysts.push((producer, settings.depends_on.clone()));
    }
    if analysts.is_empty() {
        return Err(EngineError::Configuration("no analysts are enabled".to_string()));
    }
    Ok(ExecutionGraph::standard(analysts)?)
}

/// Opens the signal cache, restoring the spill file when one is configured.
pub fn cache_from_config(config: &Config) -> Result<SignalCache, EngineError> {
    match &config.cache.spill_path {
        Some(path) => {
            let cache = SignalCache::load(path, config.cache.capacity)?;
            tracing::info!(path = %path.display(), entries = cache.len(), "Signal cache restored.");
            Ok(cache)
        }
        None => Ok(SignalCache::new(config.cache.capacity)),
    }
}

impl Orchestrator {
    /// Wires analysts, providers and the cache from `config`.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let graph = graph_from_config(config)?;
        let registry = ProviderRegistry::from_config(config)?;
        let cache = cache_from_config(config)?;
        Orchestrator::new(graph, Arc::new(registry), Arc::new(cache))
    }
}
