use crate::attempt::ProviderAttempt;
use core_types::{DataDomain, Instrument, Market};
use std::fmt;
use thiserror::Error;

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Timeout,
    Connection,
    RateLimited,
    ServerError,
    NotFound,
    Unauthorized,
    Malformed,
}

impl FaultKind {
    /// Transient faults are retried against the same provider.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FaultKind::Timeout | FaultKind::Connection | FaultKind::RateLimited | FaultKind::ServerError
        )
    }

    /// Maps a non-success HTTP status onto a fault kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 402 | 403 => FaultKind::Unauthorized,
            404 => FaultKind::NotFound,
            408 => FaultKind::Timeout,
            429 => FaultKind::RateLimited,
            500..=599 => FaultKind::ServerError,
            _ => FaultKind::Malformed,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FaultKind::Timeout => "timeout",
            FaultKind::Connection => "connection error",
            FaultKind::RateLimited => "rate limited",
            FaultKind::ServerError => "server error",
            FaultKind::NotFound => "not found",
            FaultKind::Unauthorized => "unauthorized",
            FaultKind::Malformed => "malformed request",
        };
        f.write_str(label)
    }
}

/// A single failed provider call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProviderFault {
    pub kind: FaultKind,
    pub message: String,
}

impl ProviderFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ProviderFault {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FaultKind::Timeout
        } else if err.is_decode() {
            FaultKind::Malformed
        } else if let Some(status) = err.status() {
            FaultKind::from_status(status.as_u16())
        } else {
            FaultKind::Connection
        };
        Self::new(kind, err.to_string())
    }
}

/// Every provider of a chain was exhausted without producing data.
#[derive(Error, Debug, Clone)]
#[error("{domain} data unavailable for {instrument}: {}", summarize(.attempts))]
pub struct DataUnavailable {
    pub instrument: Instrument,
    pub domain: DataDomain,
    /// The last attempt made against each provider, in the order they were tried.
    pub attempts: Vec<ProviderAttempt>,
}

fn summarize(attempts: &[ProviderAttempt]) -> String {
    if attempts.is_empty() {
        return "no provider was attempted".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{} -> {}", a.provider, a.outcome))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error(transparent)]
    DataUnavailable(#[from] DataUnavailable),

    #[error("Instrument {instrument} ({market}) is outside the coverage of the {domain} chain for {chain_market}")]
    OutOfCoverage {
        instrument: Instrument,
        market: Market,
        chain_market: Market,
        domain: DataDomain,
    },

    #[error("No provider chain configured for {domain} data in market {market}")]
    NoChain { market: Market, domain: DataDomain },

    #[error("Provider configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_fault_kinds() {
        assert_eq!(FaultKind::from_status(401), FaultKind::Unauthorized);
        assert_eq!(FaultKind::from_status(402), FaultKind::Unauthorized);
        assert_eq!(FaultKind::from_status(404), FaultKind::NotFound);
        assert_eq!(FaultKind::from_status(422), FaultKind::Malformed);
        assert_eq!(FaultKind::from_status(429), FaultKind::RateLimited);
        assert_eq!(FaultKind::from_status(503), FaultKind::ServerError);
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(FaultKind::Timeout.is_retryable());
        assert!(FaultKind::RateLimited.is_retryable());
        assert!(FaultKind::ServerError.is_retryable());
        assert!(FaultKind::Connection.is_retryable());
        assert!(!FaultKind::Unauthorized.is_retryable());
        assert!(!FaultKind::Malformed.is_retryable());
        assert!(!FaultKind::NotFound.is_retryable());
    }
}
