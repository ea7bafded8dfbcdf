use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// Retry parameters for the fetch stage.
///
/// Delays grow as `base_delay * 2^(attempt - 1)`, capped at `max_delay`, plus a
/// uniformly random jitter in `[0, jitter]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    #[serde(rename = "jitter_ms", with = "millis")]
    pub jitter: Duration,
    /// Treat every 5xx as transient.
    pub retry_server_errors: bool,
    /// Additional statuses treated as transient.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: Duration::from_millis(250),
            retry_server_errors: true,
            retryable_statuses: vec![429],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        (self.retry_server_errors && (500..=599).contains(&status))
            || self.retryable_statuses.contains(&status)
    }

    /// Deterministic part of the delay before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.backoff(attempt).saturating_add(Duration::from_millis(extra))
    }

    /// Upper bound on the total sleep across all retries of one fetch, or
    /// `None` if it does not fit in a `Duration`.
    pub fn worst_case_delay(&self) -> Option<Duration> {
        (1..self.max_attempts.max(1)).try_fold(Duration::ZERO, |total, attempt| {
            total.checked_add(self.backoff(attempt).checked_add(self.jitter)?)
        })
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
