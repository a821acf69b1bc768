//! Retry policy with capped exponential backoff.

use std::{future::Future, time::Duration};

use serde::Deserialize;

use crate::StoreError;

/// Errors that can tell whether another attempt may succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

/// The last error once an operation stopped being retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub error: E,
}

impl RetryPolicy {
    /// A policy that never waits; used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the failed `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, Exhausted<E>>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(Exhausted { attempts: attempt, error }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn delay_doubles_until_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = RetryPolicy::default()
            .run("insert", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Unavailable("locked".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::default()
            .run("insert", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Unavailable("down".into()))
            })
            .await;
        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::default()
            .run("insert", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Backend("bad row".into()))
            })
            .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts":5}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, 200);
    }
}
