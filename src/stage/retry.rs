// file: src/stage/retry.rs
// description: retry and backoff policy applied uniformly to any stage call
// reference: retry loop with capped exponential backoff

use crate::config::{BackoffConfig, BackoffStrategy, PipelineConfig};
use crate::error::StageError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub backoff: BackoffConfig,
}

/// Final result of a retried operation and how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, StageError>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, backoff: BackoffConfig) -> Self {
        Self {
            retry_count,
            backoff,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.retry_count, config.retry_backoff.clone())
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let initial = self.backoff.initial_delay_ms as f64;
        let millis = match self.backoff.strategy {
            BackoffStrategy::Fixed => initial,
            BackoffStrategy::Exponential => {
                let exponent = retry.saturating_sub(1).min(32) as i32;
                initial * self.backoff.multiplier.powi(exponent)
            }
        };

        Duration::from_millis(millis.min(self.backoff.max_delay_ms as f64) as u64)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts. `op` receives the 1-based attempt number.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} attempt {}/{} failed ({}), retrying in {:?}",
                    label, attempt, max_attempts, error, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                debug!("{} giving up after {} attempt(s): {}", label, attempt, error);
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }
        }
    }
}
