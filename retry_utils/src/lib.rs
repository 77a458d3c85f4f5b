use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// What the caller wants done with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAdvice {
    /// Permanent failure, return the error immediately
    GiveUp,
    /// Transient failure, wait the policy's backoff delay
    Backoff,
    /// Transient failure with a server-provided wait (e.g. Retry-After)
    After(Duration),
}

/// Exponential backoff bounds for one class of operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each subsequent retry
    pub base_delay: Duration,
    /// Ceiling for any single wait, including server-provided ones
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn backoff_delay(&self, retries_so_far: u32) -> Duration {
        let factor = 1u32.checked_shl(retries_so_far).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Drives an async operation through the policy until it succeeds, the
/// classifier gives up, or attempts run out.
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
    advise: impl Fn(&E) -> RetryAdvice,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retries = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if retries > 0 {
                    debug!("Operation succeeded after {} retries", retries);
                }
                return Ok(value);
            }
            Err(err) => {
                let advice = advise(&err);
                if advice == RetryAdvice::GiveUp || retries + 1 >= policy.max_attempts {
                    return Err(err);
                }

                let delay = match advice {
                    RetryAdvice::After(server_delay) => server_delay.min(policy.max_delay),
                    _ => policy.backoff_delay(retries),
                };
                warn!(
                    "Attempt {}/{} failed: {} - retrying in {}ms",
                    retries + 1,
                    policy.max_attempts,
                    err,
                    delay.as_millis()
                );

                tokio::time::sleep(delay).await;
                retries += 1;
            }
        }
    }
}
