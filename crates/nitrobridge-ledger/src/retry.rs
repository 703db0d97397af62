//! Bounded retry with exponential backoff
//!
//! Only errors that report `is_retriable()` are retried. Reverts, protocol
//! violations and timeouts are returned on the first occurrence.

use std::future::Future;
use std::time::Duration;

use nitrobridge_types::{duration_ms, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt + 1` (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let ms = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(ms as u64).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails non-retriably, or attempts run out
    pub async fn run<F, Fut, T>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retriable() && attempt + 1 < attempts => {
                    let backoff = self.backoff_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitrobridge_types::NitroBridgeError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_secs(8),
            max_backoff: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = RetryPolicy::default()
            .run("eth_sendTransaction", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(NitroBridgeError::transient("eth_sendTransaction", "connection reset"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = RetryPolicy::default()
            .run("eth_call", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NitroBridgeError::transient("eth_call", "503"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_protocol_violation_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = RetryPolicy::default()
            .run("approve", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NitroBridgeError::protocol("reverted"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
