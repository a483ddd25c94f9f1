use crate::error::ProviderFault;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed(ProviderFault),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("success"),
            AttemptOutcome::Failed(fault) => write!(f, "{}", fault),
        }
    }
}

/// Transient record of one provider call. Reported inside `DataUnavailable`,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: String,
    /// 1-based attempt number against this provider.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

impl ProviderAttempt {
    pub fn fault(&self) -> Option<&ProviderFault> {
        match &self.outcome {
            AttemptOutcome::Success => None,
            AttemptOutcome::Failed(fault) => Some(fault),
        }
    }
}
