//! Caller-side retry for transient classifier failures.
//!
//! I^B: The classifier may be briefly unavailable → bounded retry with
//! exponential backoff. Only `TriageError::is_retryable` errors are retried;
//! an unrecognized label or invalid input is returned on first sight.

use crate::models::{Result, RetryConfig, TriageError};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
            max_backoff,
        }
    }

    /// Single attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_backoff_ms),
            Duration::from_secs(config.max_backoff_secs),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following `attempt` (0-based).
    ///
    /// A `retry-after` hint wins over the computed backoff; both are capped.
    pub fn backoff(&self, attempt: u32, error: &TriageError) -> Duration {
        let computed = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(attempt));
        let delay = error
            .retry_after()
            .filter(|s| *s >= 0.0)
            .map(|s| Duration::from_secs_f64(s.min(self.max_backoff.as_secs_f64())))
            .unwrap_or(computed);
        delay.min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Returns the last result and the number of attempts made.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let result = op().await;
            attempt += 1;

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let backoff = self.backoff(attempt - 1, &e);
                    debug!(
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying after transient classifier failure"
                    );
                    tokio::time::sleep(backoff).await;
                }
                other => return (other, attempt),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fakes::{FixedClassifier, ScriptedClassifier};
    use crate::pipeline::VerificationOrchestrator;
    use crate::policy::RecommendationPolicy;
    use crate::models::{RiskLevel, UnavailableCause};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(1), Duration::from_secs(30))
    }

    fn pipeline(classifier: Arc<dyn crate::client::RiskClassifier>) -> VerificationOrchestrator {
        VerificationOrchestrator::new(
            classifier,
            Arc::new(RecommendationPolicy::canonical()),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5));
        let err = TriageError::from(UnavailableCause::ServerError {
            status: 500,
            message: String::new(),
        });
        assert_eq!(p.backoff(0, &err), Duration::from_secs(1));
        assert_eq!(p.backoff(1, &err), Duration::from_secs(2));
        assert_eq!(p.backoff(2, &err), Duration::from_secs(4));
        assert_eq!(p.backoff(3, &err), Duration::from_secs(5));
        assert_eq!(p.backoff(40, &err), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_prefers_retry_after() {
        let p = policy(3);
        let err = TriageError::from(UnavailableCause::RateLimited {
            retry_after_secs: Some(7.0),
        });
        assert_eq!(p.backoff(0, &err), Duration::from_secs(7));
    }

    #[test]
    fn test_huge_retry_after_is_capped() {
        let p = policy(3);
        for secs in [1e20, f64::INFINITY] {
            let err = TriageError::from(UnavailableCause::RateLimited {
                retry_after_secs: Some(secs),
            });
            assert_eq!(p.backoff(0, &err), Duration::from_secs(30));
        }

        let err = TriageError::from(UnavailableCause::RateLimited {
            retry_after_secs: Some(f64::NAN),
        });
        assert_eq!(p.backoff(0, &err), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let classifier = Arc::new(ScriptedClassifier::unavailable_then("High", 2));
        let pipeline = pipeline(classifier.clone());

        let (result, attempts) = policy(3).run(|| pipeline.decide("context")).await;
        assert_eq!(result.unwrap().risk_level(), RiskLevel::High);
        assert_eq!(attempts, 3);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let classifier = Arc::new(ScriptedClassifier::unavailable_then("Low", 5));
        let pipeline = pipeline(classifier.clone());

        let (result, attempts) = policy(2).run(|| pipeline.decide("context")).await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(attempts, 2);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unrecognized_label_is_not_retried() {
        let classifier = Arc::new(FixedClassifier::new("Unknown"));
        let pipeline = pipeline(classifier.clone());

        let (result, attempts) = policy(5).run(|| pipeline.decide("context")).await;
        assert!(matches!(
            result,
            Err(TriageError::UnrecognizedRiskLabel { .. })
        ));
        assert_eq!(attempts, 1);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }
}
