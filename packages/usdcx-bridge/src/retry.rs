//! Retry policy for ledger reads
//!
//! Only transient (`Network`) failures are retried, with exponential backoff.
//! Writes are never routed through here: re-sending a transaction could submit
//! it twice.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::LedgerError;

/// Read retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Run a ledger read, retrying transient failures with backoff
pub async fn with_retry<F, T, Fut>(
    config: &RetryConfig,
    what: &str,
    mut operation: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && config.should_retry(attempt) => {
                let backoff = config.backoff_for_attempt(attempt);
                attempt += 1;
                warn!(
                    what = what,
                    attempt = attempt,
                    max = config.max_retries,
                    ?backoff,
                    error = %e,
                    "Transient ledger error, retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                debug!(what = what, attempt = attempt, error = %e, "Ledger read failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig::default();

        assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(4), Duration::from_secs(5)); // capped
    }

    #[test]
    fn test_should_retry() {
        let config = RetryConfig::default();
        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
        assert!(!RetryConfig::none().should_retry(0));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = with_retry(&fast(), "balance", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LedgerError::network("connection reset"))
            } else {
                Ok(42u128)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<u128, _> = with_retry(&fast(), "balance", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::network("connection refused"))
        })
        .await;

        assert_eq!(result.unwrap_err().kind, LedgerErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<u128, _> = with_retry(&fast(), "allowance", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::chain("execution reverted"))
        })
        .await;

        assert_eq!(result.unwrap_err().kind, LedgerErrorKind::Chain);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
