//! bounded exponential backoff for custodian calls
//!
//! only errors where [`crate::Error::is_transient`] holds are retried. decryption
//! and verification failures come back on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::Result;

/// how hard to retry a transient failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// total attempts including the first
    pub max_attempts: u32,
    /// delay before the second attempt, doubled each time
    pub initial_backoff: Duration,
    /// cap on a single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// no retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// run `op` until it succeeds, fails permanently, or attempts run out
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < max => {
                let delay = policy.delay(attempt);
                tracing::debug!(
                    attempt,
                    max_attempts = max,
                    "{what} failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(attempts = attempt, "{what} gave up: {e}");
                }
                return Err(e);
            }
            ok => return ok,
        }
    }
}
