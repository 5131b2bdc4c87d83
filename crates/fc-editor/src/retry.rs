//! Bounded retry with exponential backoff.

use fc_core::EditorConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least one attempt is made.
    pub max_attempts: u32,
    /// Wait after the first failure; doubled after each further failure.
    pub base_delay: Duration,
}

/// Every attempt failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(
            config.init_retry_attempts,
            Duration::from_millis(config.init_retry_base_ms),
        )
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds or attempts run out, calling `sleep`
    /// between attempts. `op` receives the 1-based attempt number.
    pub fn run<T, E: std::fmt::Display>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, Exhausted<E>> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    log::warn!("attempt {attempt}/{attempts} failed: {e}; retrying in {delay:?}");
                    sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EditorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(2), Duration::from_millis(200));
        assert_eq!(p.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn succeeds_on_later_attempt() {
        let p = RetryPolicy::new(3, Duration::from_millis(10));
        let mut slept = Vec::new();
        let out = p.run(
            |n| if n < 3 { Err("busy") } else { Ok(n) },
            |d| slept.push(d),
        );
        assert_eq!(out.unwrap(), 3);
        assert_eq!(slept, vec![Duration::from_millis(10), Duration::from_millis(20)]);
    }

    #[test]
    fn exhaustion_reports_last_error() {
        let p = RetryPolicy::new(2, Duration::ZERO);
        let err = p
            .run(|n| Err::<(), _>(format!("fail {n}")), |_| {})
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.last, "fail 2");
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let p = RetryPolicy::new(0, Duration::ZERO);
        let mut calls = 0;
        let _ = p.run(
            |_| {
                calls += 1;
                Err::<(), _>("no")
            },
            |_| {},
        );
        assert_eq!(calls, 1);
    }
}
