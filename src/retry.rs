//! One retry policy for every bounded loop in the crate.
//!
//! Blockhash fetch, endpoint probing, and relay submission all retry with
//! fixed attempt counts and different backoff curves; this module is the
//! single place that shape lives. Callers classify each error into a
//! [`RetryDirective`] so rate-limit signals can rotate immediately while
//! ordinary failures back off.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDirective {
    /// Sleep the policy's backoff for this attempt, then retry.
    Backoff,
    /// Retry immediately (e.g. a rate-limit signal where the caller will
    /// rotate to a different endpoint instead of waiting out this one).
    Immediate,
    /// The error is not retryable; stop and surface it.
    Halt,
}

/// Backoff curve, selected per call site.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// `base * attempt` (attempt is 1-based).
    Linear { base: Duration },
    /// `min(base * attempt, cap)` -- the relay submission curve.
    LinearCapped { base: Duration, cap: Duration },
    /// Constant delay between attempts.
    Fixed(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear { base } => base * attempt,
            Backoff::LinearCapped { base, cap } => (base * attempt).min(cap),
            Backoff::Fixed(d) => d,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run `op` up to `max_attempts` times. `classify` decides per error
    /// whether to back off, retry immediately, or halt. The last error is
    /// returned when attempts run out.
    pub async fn run<T, E, F, Fut, C>(&self, mut op: F, classify: C) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryDirective,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let directive = classify(&e);
                    if directive == RetryDirective::Halt || attempt >= self.max_attempts {
                        return Err(e);
                    }
                    debug!(attempt, error = %e, "retryable failure");
                    if directive == RetryDirective::Backoff {
                        sleep(self.backoff.delay(attempt)).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_curves() {
        let linear = Backoff::Linear {
            base: Duration::from_secs(1),
        };
        assert_eq!(linear.delay(1), Duration::from_secs(1));
        assert_eq!(linear.delay(3), Duration::from_secs(3));

        let capped = Backoff::LinearCapped {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(5000),
        };
        assert_eq!(capped.delay(4), Duration::from_millis(4000));
        assert_eq!(capped.delay(5), Duration::from_millis(5000));
        assert_eq!(capped.delay(9), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn halts_on_fatal_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Backoff::Fixed(Duration::from_millis(1)));
        let res: Result<(), String> = policy
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal".to_string()) }
                },
                |_| RetryDirective::Halt,
            )
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Backoff::Fixed(Duration::from_millis(1)));
        let res: Result<u32, String> = policy
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err("transient".to_string())
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |_| RetryDirective::Immediate,
            )
            .await;
        assert_eq!(res.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts() {
        let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(1)));
        let res: Result<(), String> = policy
            .run(
                |_| async { Err("nope".to_string()) },
                |_| RetryDirective::Immediate,
            )
            .await;
        assert_eq!(res.unwrap_err(), "nope");
    }
}
