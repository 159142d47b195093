use std::future::Future;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::config::RetryPolicy;
use crate::error::{AnalysisError, Result};

/// Runs `op` until it succeeds or the policy's retries are exhausted.
///
/// Only upstream failures are retried; cancellation and local errors are
/// returned immediately. The last upstream error is returned when every
/// attempt fails.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = jittered(policy.delay_for(attempt));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempt < policy.max_retries => {
                warn!(
                    "{} failed (attempt {}/{}), retrying: {}",
                    label,
                    attempt + 1,
                    policy.max_retries + 1,
                    err
                );
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Undecodable model replies already arrive here as `UpstreamService`.
fn is_retryable(err: &AnalysisError) -> bool {
    matches!(err, AnalysisError::UpstreamService(_))
}

fn jittered(delay: Duration) -> Duration {
    let millis = delay.as_millis() as u64;
    if millis == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=millis / 10);
    Duration::from_millis(millis + jitter)
}
