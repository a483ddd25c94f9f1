use crate::error::FaultKind;
use configuration::RetrySettings;
use rand::Rng;
use std::time::Duration;

/// Retry and timeout parameters shared by every provider chain.
///
/// Backoff is exponential with full jitter: before retry `n` (0-based) the chain sleeps
/// a uniformly random duration in `[0, min(initial * 2^n, max_delay)]`, where `initial`
/// is the rate-limit delay after a 429 and the base delay otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
    pub fetch_timeout: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            rate_limit_delay: Duration::from_millis(settings.rate_limit_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            attempt_timeout: Duration::from_millis(settings.attempt_timeout_ms),
            fetch_timeout: Duration::from_millis(settings.fetch_timeout_ms),
            jitter: settings.jitter,
        }
    }

    /// The upper bound of the backoff before retry `retry_index` after a fault of `kind`.
    pub fn ceiling(&self, kind: FaultKind, retry_index: u32) -> Duration {
        let initial = match kind {
            FaultKind::RateLimited => self.rate_limit_delay,
            _ => self.base_delay,
        };
        let factor = 1u32 << retry_index.min(16);
        initial.saturating_mul(factor).min(self.max_delay)
    }

    /// The actual delay to sleep before retry `retry_index`.
    pub fn backoff(&self, kind: FaultKind, retry_index: u32) -> Duration {
        let ceiling = self.ceiling(kind, retry_index);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            rate_limit_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(2_500),
            attempt_timeout: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(30),
            jitter,
        }
    }

    #[test]
    fn ceiling_doubles_and_caps() {
        let p = policy(false);
        assert_eq!(p.ceiling(FaultKind::ServerError, 0), Duration::from_millis(100));
        assert_eq!(p.ceiling(FaultKind::ServerError, 1), Duration::from_millis(200));
        assert_eq!(p.ceiling(FaultKind::ServerError, 2), Duration::from_millis(400));
        assert_eq!(p.ceiling(FaultKind::ServerError, 10), Duration::from_millis(2_500));
    }

    #[test]
    fn rate_limits_start_from_the_longer_delay() {
        let p = policy(false);
        assert_eq!(p.ceiling(FaultKind::RateLimited, 0), Duration::from_millis(1_000));
        assert_eq!(p.ceiling(FaultKind::RateLimited, 1), Duration::from_millis(2_000));
        assert!(p.ceiling(FaultKind::RateLimited, 0) > p.ceiling(FaultKind::Timeout, 0));
    }

    #[test]
    fn jittered_backoff_stays_under_the_ceiling() {
        let p = policy(true);
        for retry in 0..4 {
            for _ in 0..50 {
                assert!(p.backoff(FaultKind::Timeout, retry) <= p.ceiling(FaultKind::Timeout, retry));
            }
        }
    }
}
