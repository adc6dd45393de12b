use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff shared by stream connection retry and socket reconnects.
///
/// `delay(n) = base * 2^n`, with `n` starting at 0. Jitter is not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay before the first retry.
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    /// Additional attempts allowed after the first one.
    #[serde(default)]
    pub max_retries: u32,
    /// Optional upper bound for a computed delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

const fn default_base_ms() -> u64 {
    1_000
}

impl Default for Backoff {
    fn default() -> Self {
        Self::none()
    }
}

impl Backoff {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            base_ms: default_base_ms(),
            max_retries: 0,
            max_delay_ms: None,
        }
    }

    pub fn exponential(max_retries: u32, base: Duration) -> Self {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        Self {
            base_ms,
            max_retries,
            max_delay_ms: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = Some(u64::try_from(max_delay.as_millis()).unwrap_or(u64::MAX).max(1));
        self
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self.base_ms.saturating_mul(factor);
        let millis = match self.max_delay_ms {
            Some(cap) => millis.min(cap),
            None => millis,
        };
        Duration::from_millis(millis)
    }
}

/// Attempt counter for one logical request or one reconnect cycle.
///
/// Never shared: every new request starts from a fresh `RetryState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Returns the delay for the current attempt and advances the counter.
    pub fn next_delay(&mut self, backoff: &Backoff) -> Duration {
        let delay = backoff.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_from_base() {
        let backoff = Backoff::exponential(5, Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_respects_optional_cap() {
        let backoff = Backoff::exponential(5, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250));
        assert_eq!(backoff.delay(1).as_millis(), 200);
        assert_eq!(backoff.delay(2).as_millis(), 250);
    }

    #[test]
    fn huge_attempts_saturate_instead_of_overflowing() {
        let backoff = Backoff::exponential(1, Duration::from_secs(1));
        assert_eq!(backoff.delay(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn none_policy_never_retries() {
        assert!(!Backoff::none().can_retry(0));
    }

    #[test]
    fn retry_state_counts_and_resets() {
        let backoff = Backoff::exponential(2, Duration::from_millis(10));
        let mut state = RetryState::new(backoff.max_retries);
        assert_eq!(state.next_delay(&backoff).as_millis(), 10);
        assert_eq!(state.next_delay(&backoff).as_millis(), 20);
        assert!(state.exhausted());
        state.reset();
        assert_eq!(state.attempt, 0);
    }
}
