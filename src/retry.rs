use crate::error::ScanError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, ScanError>;

/// Linear retry for transient transport faults inside the provider adapters.
/// Only errors reporting themselves recoverable are retried; the scheduler
/// itself never retries a probe.
pub async fn retry_with_linear_backoff<F, Fut, T>(
    operation: F,
    max_attempts: u32,
    delay_ms: u64,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        debug!("Attempt {} of {}", attempt, max_attempts);

        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_recoverable() || attempt >= max_attempts {
                    return Err(err);
                }

                warn!("Attempt {} failed: {}, retrying in {}ms", attempt, err, delay_ms);
                sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}
