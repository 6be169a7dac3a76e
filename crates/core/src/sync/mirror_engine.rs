//! Retry and backoff helpers for mirror orchestration.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::errors::StoreError;

/// Bounded exponential backoff applied to retryable store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1_u32 << exp)
            .min(self.max_delay)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let backoff = self.delay_for(attempt);
        let bound = (backoff.as_millis() as u64 / 5).max(1);
        let jitter = rand::thread_rng().gen_range(0..=bound);
        backoff.saturating_add(Duration::from_millis(jitter))
    }
}

/// Runs `op` until it succeeds, fails permanently, or attempts run out.
///
/// Returns the final result and the number of attempts made. Only errors that
/// classify as retryable are retried, unless `retry_writes` is set, which
/// callers use for idempotent writes.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    retry_writes: bool,
    mut op: F,
) -> (Result<T, StoreError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return (Ok(value), attempt),
            Err(err) => {
                let retryable = err.is_retryable()
                    || (retry_writes && matches!(err, StoreError::Write { .. }));
                if !retryable || attempt >= max_attempts {
                    return (Err(err), attempt);
                }
                let delay = policy.delay_with_jitter(attempt);
                warn!(
                    "[Mirror] {} failed (attempt {}/{}): {}. Retrying in {}ms",
                    label,
                    attempt,
                    max_attempts,
                    err,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Delay in seconds before the next scheduled run after consecutive failed runs.
pub fn run_backoff_seconds(base_interval_secs: u64, consecutive_failures: u32) -> u64 {
    const MAX_EXPONENT: u32 = 6;
    const BASE_DELAY_SECONDS: u64 = 30;

    if consecutive_failures == 0 {
        return base_interval_secs;
    }
    let capped = consecutive_failures.min(MAX_EXPONENT);
    (BASE_DELAY_SECONDS * 2_u64.pow(capped)).min(base_interval_secs.max(BASE_DELAY_SECONDS))
}

/// Cooperative cancellation shared between a scheduler and a running mirror.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
