//! # Quorum Providers
//!
//! The data-acquisition layer: every byte of market data the analysts see comes
//! through here.
//!
//! ## Architectural Principles
//! - **Trait at the seam:** `DataProvider` is the only thing a vendor has to implement,
//!   so tests swap real vendors for scripted fakes.
//! - **Explicit failover:** a `ProviderChain` tries its providers in priority order,
//!   retrying transient faults under one shared `RetryPolicy` before moving on.
//! - **No caching:** every `fetch` reaches a provider. Memoization lives one layer up.
//!
//! ## Public API
//! - `DataProvider`, `ProviderFault`, `FaultKind`
//! - `RetryPolicy`, `ProviderChain`, `ProviderRegistry`
//! - `RestProvider`: the JSON-over-HTTP vendor implementation.

pub mod attempt;
pub mod chain;
pub mod error;
pub mod provider;
pub mod registry;
pub mod rest;
pub mod retry;

// --- Public API ---
pub use attempt::{AttemptOutcome, ProviderAttempt};
pub use chain::ProviderChain;
pub use error::{DataUnavailable, FaultKind, ProviderError, ProviderFault};
pub use provider::DataProvider;
pub use registry::ProviderRegistry;
pub use rest::RestProvider;
pub use retry::RetryPolicy;
