use crate::settings::{AggregatorSettings, Config, RiskSettings};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The configuration bag carried by one run request.
///
/// It is built once per run and passed down explicitly; nothing reads configuration
/// from global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Selected model per node identity.
    pub models: BTreeMap<String, String>,
    /// Parameter overrides per node identity.
    pub overrides: BTreeMap<String, BTreeMap<String, Decimal>>,
    pub risk: RiskSettings,
    pub aggregator: AggregatorSettings,
    /// Calendar days of history fetched for each analyst.
    pub lookback_days: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            models: BTreeMap::new(),
            overrides: BTreeMap::new(),
            risk: RiskSettings::default(),
            aggregator: AggregatorSettings::default(),
            lookback_days: 120,
        }
    }
}

impl RunConfig {
    /// Derives the per-run bag from the loaded application configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut models = BTreeMap::new();
        let mut overrides = BTreeMap::new();
        for analyst in config.enabled_analysts() {
            let node = analyst.id.as_str().to_string();
            if let Some(model) = &analyst.model {
                models.insert(node.clone(), model.clone());
            }
            if !analyst.params.is_empty() {
                overrides.insert(node, analyst.params.clone());
            }
        }

        Self {
            models,
            overrides,
            risk: config.risk.clone(),
            aggregator: config.aggregator.clone(),
            lookback_days: config.backtest.lookback_days,
        }
    }

    pub fn model_for(&self, node_id: &str) -> Option<&str> {
        self.models.get(node_id).map(String::as_str)
    }

    /// The overrides for a node; empty when none were given.
    pub fn overrides_for(&self, node_id: &str) -> BTreeMap<String, Decimal> {
        self.overrides.get(node_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn overrides_for_unknown_node_are_empty() {
        let mut config = RunConfig::default();
        config
            .overrides
            .insert("technicals".to_string(), BTreeMap::from([("rsi_period".to_string(), dec!(10))]));
        assert_eq!(config.overrides_for("technicals").get("rsi_period"), Some(&dec!(10)));
        assert!(config.overrides_for("sentiment").is_empty());
        assert_eq!(config.model_for("technicals"), None);
    }
}
