//! Retry engine with configurable backoff for transient file-system faults.
//!
//! Only errors the caller's predicate accepts are retried; validation
//! failures, cancellations, and not-found conditions always surface on the
//! first attempt.
use std::time::Duration;

use tokio::time::sleep;

use crate::config::RetrySettings;
use crate::error::{FramegateError, FramegateResult};

/// Delay growth strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial * attempt`
    Linear,
    /// `initial * factor^attempt`
    Exponential(f64),
    /// `initial * fib(attempt)`
    Fibonacci,
}

/// Retry policy for one operation family.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Growth strategy.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Exponential(2.0),
        }
    }
}

impl RetryPolicy {
    /// Policy from runtime settings with an explicit attempt count
    /// (read/write/delete use `max_attempts`, copy/enumerate the bulk count).
    pub fn from_settings(settings: &RetrySettings, max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_delay: settings.initial_delay,
            max_delay: settings.max_delay,
            backoff: Backoff::Exponential(2.0),
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let initial = self.initial_delay.as_millis() as f64;
        let ms = match self.backoff {
            Backoff::Linear => initial * (attempt + 1) as f64,
            Backoff::Exponential(factor) => initial * factor.powi(attempt as i32),
            Backoff::Fibonacci => initial * fibonacci(attempt + 1) as f64,
        };
        Duration::from_millis(ms as u64).min(self.max_delay)
    }
}

fn fibonacci(n: usize) -> u64 {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 1..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

/// Run `operation` until it succeeds, the predicate rejects the error, or
/// attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, P>(
    operation: F,
    policy: &RetryPolicy,
    should_retry: P,
) -> FramegateResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = FramegateResult<T>>,
    P: Fn(&FramegateError) -> bool,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }
                log::debug!(
                    "attempt {}/{} failed, retrying: {}",
                    attempt + 1,
                    policy.max_attempts,
                    e
                );
                last_error = Some(e);
                if attempt < policy.max_attempts - 1 {
                    sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(last_error.expect("at least one attempt ran"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            backoff: Backoff::Exponential(2.0),
        }
    }

    fn transient() -> FramegateError {
        std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk").into()
    }

    #[tokio::test]
    async fn test_retry_success_on_second_attempt() {
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(transient())
                } else {
                    Ok("second attempt")
                }
            },
            &fast_policy(3),
            FramegateError::is_transient,
        )
        .await;
        assert_eq!(result.unwrap(), "second attempt");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let attempts = AtomicUsize::new(0);
        let result: FramegateResult<()> = retry_with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            },
            &fast_policy(2),
            FramegateError::is_transient,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let attempts = AtomicUsize::new(0);
        let result: FramegateResult<()> = retry_with_backoff(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(FramegateError::cancelled("op-1"))
            },
            &fast_policy(5),
            FramegateError::is_transient,
        )
        .await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_delays_grow() {
        let times = Mutex::new(Vec::new());
        let _: FramegateResult<()> = retry_with_backoff(
            || async {
                times.lock().unwrap().push(std::time::Instant::now());
                Err(transient())
            },
            &RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(500),
                backoff: Backoff::Exponential(2.0),
            },
            FramegateError::is_transient,
        )
        .await;
        let times = times.lock().unwrap();
        assert_eq!(times.len(), 3);
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert!(first_gap >= Duration::from_millis(15));
        assert!(second_gap >= first_gap);
    }

    #[test]
    fn test_delay_schedules() {
        let linear = RetryPolicy {
            backoff: Backoff::Linear,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        };
        assert_eq!(linear.delay_for(0), Duration::from_millis(100));
        assert_eq!(linear.delay_for(2), Duration::from_millis(300));

        let exp = RetryPolicy::default();
        assert_eq!(exp.delay_for(0), Duration::from_millis(500));
        assert_eq!(exp.delay_for(1), Duration::from_millis(1000));
        assert_eq!(exp.delay_for(2), Duration::from_millis(2000));

        let fib = RetryPolicy {
            backoff: Backoff::Fibonacci,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_attempts: 6,
        };
        assert_eq!(fib.delay_for(0), Duration::from_millis(100));
        assert_eq!(fib.delay_for(1), Duration::from_millis(100));
        assert_eq!(fib.delay_for(2), Duration::from_millis(200));
        assert_eq!(fib.delay_for(3), Duration::from_millis(300));
        assert_eq!(fib.delay_for(4), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            backoff: Backoff::Exponential(3.0),
        };
        assert_eq!(policy.delay_for(8), Duration::from_secs(2));
    }
}
