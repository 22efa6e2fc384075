//! Bounded exponential backoff.
//!
//! [`with_retry`] runs one operation until it succeeds, the policy's retry
//! budget is spent, or the caller cancels. Attempt `n` (from 0) that fails is
//! followed by a sleep of `min(base_delay * 2^n, max_delay)`, optionally
//! jittered downwards.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Retry settings, fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `3` means up to 4 attempts.
    pub max_retries: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Fraction in `[0, 1]` by which a delay may be shortened at random.
    /// `0` gives the exact doubling sequence.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// A policy without jitter.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: 0.0,
        }
    }

    /// Set the jitter fraction, clamped to `[0, 1]`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// The un-jittered delay after failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// The delay to actually sleep after failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }

        let floor = delay.mul_f64(1.0 - self.jitter.min(1.0));
        let low = u64::try_from(floor.as_nanos()).unwrap_or(u64::MAX);
        let high = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        if low >= high {
            return delay;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(low..=high))
    }
}

/// Why [`with_retry`] gave up.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed; `last` is the final failure.
    #[error("{last} (after {attempts} attempts)")]
    Exhausted { attempts: u32, last: E },

    /// The caller cancelled before an attempt succeeded.
    #[error("cancelled")]
    Cancelled,
}

/// Run `op` under `policy`.
///
/// `op` receives the attempt index. Cancellation is observed both while an
/// attempt is running and while sleeping between attempts.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 0;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            outcome = op(attempt) => outcome,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(last) if attempt >= policy.max_retries => {
                tracing::warn!(attempts = attempt + 1, error = %last, "retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last,
                });
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, retry scheduled"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}
