//! Retry with exponential backoff for transient call failures.
//!
//! Only errors for which [`CallError::is_transient`] holds are retried;
//! permanent failures return on the first attempt.

use std::thread::sleep;
use std::time::{Duration, SystemTime};

use crate::error::CallError;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Add up to 25% jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Fail immediately.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retry without sleeping. Tests only need the attempt count.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let delay = if self.jitter {
            capped * (1.0 + jitter_factor() * 0.25)
        } else {
            capped
        };
        Duration::from_millis(delay as u64)
    }
}

/// Pseudo-random factor in `0.0..1.0`.
fn jitter_factor() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Run `f`, retrying transient failures according to `config`.
pub fn with_retry<T, F>(config: &RetryConfig, operation: &str, mut f: F) -> Result<T, CallError>
where
    F: FnMut() -> Result<T, CallError>,
{
    let mut attempt = 0;
    loop {
        match f() {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!("{operation} succeeded after {attempt} retries");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    "{operation} failed (attempt {}/{}), retrying in {:?}: {err}",
                    attempt + 1,
                    config.max_retries + 1,
                    delay
                );
                sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn transient() -> CallError {
        CallError::Status {
            operation: "list".into(),
            status: 503,
            body: String::new(),
        }
    }

    fn permanent() -> CallError {
        CallError::Status {
            operation: "list".into(),
            status: 400,
            body: "bad request".into(),
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let delay = config.delay_for_attempt(0);
        assert!(delay >= Duration::from_millis(1000));
        assert!(delay <= Duration::from_millis(1250));
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let calls = Cell::new(0);
        let result = with_retry(&RetryConfig::immediate(3), "list", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(transient())
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.expect("eventually ok"), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retries_are_bounded() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(&RetryConfig::immediate(2), "list", || {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(&RetryConfig::immediate(5), "list", || {
            calls.set(calls.get() + 1);
            Err(permanent())
        });
        assert!(matches!(result, Err(CallError::Status { status: 400, .. })));
        assert_eq!(calls.get(), 1);
    }
}
