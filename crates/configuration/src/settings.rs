use crate::error::ConfigError;
use chrono::NaiveDate;
use core_types::{AnalystId, DataDomain, Market};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub aggregator: AggregatorSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
    #[serde(default)]
    pub analysts: Vec<AnalystSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, logs are also written to a daily-rolled file in this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

/// Parameters of the retry/backoff policy shared by every provider chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per provider before the chain moves on.
    pub max_attempts: u32,
    /// Initial backoff ceiling for timeouts, connection errors and 5xx responses.
    pub base_delay_ms: u64,
    /// Initial backoff ceiling after a rate-limit response.
    pub rate_limit_delay_ms: u64,
    /// Upper bound on any single backoff.
    pub max_delay_ms: u64,
    /// Budget for one provider call.
    pub attempt_timeout_ms: u64,
    /// Budget for one whole chain `fetch`, including backoff.
    pub fetch_timeout_ms: u64,
    /// Full jitter on/off. Off makes the delays exact, which tests rely on.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            rate_limit_delay_ms: 5_000,
            max_delay_ms: 30_000,
            attempt_timeout_ms: 15_000,
            fetch_timeout_ms: 120_000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of completed entries kept in memory.
    pub capacity: usize,
    /// Optional JSON file the cache is loaded from at start and spilled to at the end.
    pub spill_path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 4_096,
            spill_path: None,
        }
    }
}

/// Parameters of the risk constraint evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Base fraction of total equity one instrument may occupy (e.g., 0.20 for 20%).
    pub max_position_pct: Decimal,
    /// Number of daily returns used for the volatility estimate.
    pub volatility_lookback_days: usize,
    /// Annualised volatility above which the position limit is halved.
    pub high_volatility: Decimal,
    /// Fraction of short notional that must be posted as collateral.
    pub margin_requirement: Decimal,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_position_pct: dec!(0.20),
            volatility_lookback_days: 60,
            high_volatility: dec!(0.50),
            margin_requirement: dec!(0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorSettings {
    /// Whether a bearish consensus on a flat position may open a short.
    pub allow_short: bool,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self { allow_short: true }
    }
}

/// Contains parameters for a backtest run. Dates may also be given on the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// The initial starting capital for the simulation.
    pub initial_cash: Decimal,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Calendar days of history each analyst sees on every step.
    pub lookback_days: u32,
    /// When set, the performance report is written here as JSON.
    pub report_path: Option<PathBuf>,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_cash: dec!(100000),
            start_date: None,
            end_date: None,
            lookback_days: 120,
            report_path: None,
        }
    }
}

/// One upstream data vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key, if the vendor needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub markets: Vec<Market>,
    pub domains: Vec<DataDomain>,
    /// Lower ranks are tried first.
    #[serde(default)]
    pub priority: u32,
}

/// One analyst node of the execution graph.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalystSettings {
    pub id: AnalystId,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Model selection for analysts that consult one.
    #[serde(default)]
    pub model: Option<String>,
    /// Node identities whose signals this analyst reads.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Analyst-specific numeric parameters.
    #[serde(default)]
    pub params: BTreeMap<String, Decimal>,
}

fn enabled_by_default() -> bool {
    true
}

impl Config {
    /// The analysts that take part in a run, in declaration order.
    pub fn enabled_analysts(&self) -> impl Iterator<Item = &AnalystSettings> {
        self.analysts.iter().filter(|a| a.enabled)
    }

    /// Rejects settings no run could succeed with. Called by `load_config`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.attempt_timeout_ms == 0 || self.retry.fetch_timeout_ms == 0 {
            return fail("retry timeouts must be positive".to_string());
        }
        if self.cache.capacity == 0 {
            return fail("cache.capacity must be at least 1".to_string());
        }
        if self.risk.max_position_pct <= Decimal::ZERO || self.risk.max_position_pct > Decimal::ONE {
            return fail(format!(
                "risk.max_position_pct must be in (0, 1], got {}",
                self.risk.max_position_pct
            ));
        }
        if self.risk.margin_requirement <= Decimal::ZERO || self.risk.margin_requirement > Decimal::ONE {
            return fail(format!(
                "risk.margin_requirement must be in (0, 1], got {}",
                self.risk.margin_requirement
            ));
        }
        if self.risk.volatility_lookback_days < 2 {
            return fail("risk.volatility_lookback_days must be at least 2".to_string());
        }
        if self.backtest.initial_cash <= Decimal::ZERO {
            return fail("backtest.initial_cash must be positive".to_string());
        }
        if let (Some(start), Some(end)) = (self.backtest.start_date, self.backtest.end_date) {
            if start > end {
                return fail(format!("backtest.start_date {} is after end_date {}", start, end));
            }
        }

        if self.providers.is_empty() {
            return fail("at least one [[providers]] entry is required".to_string());
        }
        let mut provider_names = HashSet::new();
        for provider in &self.providers {
            if !provider_names.insert(provider.name.as_str()) {
                return fail(format!("duplicate provider name '{}'", provider.name));
            }
            if provider.markets.is_empty() || provider.domains.is_empty() {
                return fail(format!(
                    "provider '{}' must cover at least one market and one domain",
                    provider.name
                ));
            }
        }

        let mut analyst_ids = HashSet::new();
        for analyst in &self.analysts {
            if !analyst_ids.insert(analyst.id) {
                return fail(format!("analyst '{}' is declared twice", analyst.id));
            }
        }
        if self.enabled_analysts().next().is_none() {
            return fail("at least one analyst must be enabled".to_string());
        }

        Ok(())
    }
}
