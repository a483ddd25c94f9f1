//! # Quorum Configuration
//!
//! Strongly-typed settings for the whole workspace, loaded from a TOML file and
//! layered with `QUORUM__`-prefixed environment variables.
//!
//! ## Public API
//! - `load_config(path)`: read, deserialize and validate a `Config`.
//! - `RunConfig`: the per-request configuration bag handed to the orchestrator.
//! - `init_tracing`: installs the global `tracing` subscriber.

use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod run_config;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use logging::init_tracing;
pub use run_config::RunConfig;
pub use settings::{
    AggregatorSettings, Config, AnalystSettings, BacktestSettings, CacheSettings, LoggingSettings,
    ProviderSettings, RetrySettings, RiskSettings,
};

/// Prefix for environment overrides, e.g. `QUORUM__RETRY__BASE_DELAY_MS=250`.
pub const ENV_PREFIX: &str = "QUORUM";

/// Loads the application configuration from the given TOML file.
///
/// Environment variables prefixed with `QUORUM__` override file values. The result is
/// validated before it is returned, so callers never see a half-usable `Config`.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{AnalystId, DataDomain, Market};
    use std::io::Write;

    const SAMPLE: &str = r#"
[logging]
level = "debug"

[retry]
max_attempts = 3
base_delay_ms = 200

[cache]
capacity = 64

[backtest]
initial_cash = 100000
start_date = "2024-01-02"
end_date = "2024-03-29"

[[providers]]
name = "primary"
base_url = "https://data.example.com"
markets = ["us"]
domains = ["prices", "financials", "ownership"]
priority = 0

[[analysts]]
id = "technicals"

[[analysts]]
id = "sentiment"
depends_on = ["technicals"]
params = { news_weight = 0.6 }
"#;

    #[test]
    fn loads_and_validates_a_full_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.retry.rate_limit_delay_ms, RetrySettings::default().rate_limit_delay_ms);
        assert_eq!(config.cache.capacity, 64);
        assert_eq!(config.providers[0].markets, vec![Market::Us]);
        assert!(config.providers[0].domains.contains(&DataDomain::Ownership));
        assert_eq!(config.analysts[1].id, AnalystId::Sentiment);
        assert_eq!(config.analysts[1].depends_on, vec!["technicals".to_string()]);
        assert!(config.analysts[1].params.contains_key("news_weight"));
    }

    #[test]
    fn unknown_analyst_id_fails_to_load() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let broken = SAMPLE.replace("id = \"sentiment\"", "id = \"astrology\"");
        file.write_all(broken.as_bytes()).unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::LoadError(_))));
    }
}
