use std::time::Duration;

use super::types::StoreError;
use tracing::warn;

/// Default number of connection attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause between two connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Fixed back-off retry configuration for connection acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Execute a blocking operation with fixed back-off retries.
///
/// Only errors classified as retryable are retried. Once every attempt has
/// failed the last error is wrapped into [`StoreError::RetriesExhausted`],
/// which is fatal for the caller.
pub fn with_retry<T, F>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let max_attempts = config.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match operation() {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let classification = err.classify();
        if !classification.retryable {
            warn!(
                operation = operation_name,
                error_type = classification.error_type,
                "Non-retryable error, failing immediately"
            );
            return Err(err);
        }

        if attempt >= max_attempts {
            warn!(
                operation = operation_name,
                attempt,
                max = max_attempts,
                "Max retries exhausted"
            );
            return Err(StoreError::RetriesExhausted {
                operation: operation_name.to_string(),
                attempts: attempt,
                source: Box::new(err),
            });
        }

        warn!(
            operation = operation_name,
            attempt,
            max = max_attempts,
            delay_ms = config.delay.as_millis() as u64,
            error = %err,
            "Retrying after error"
        );
        std::thread::sleep(config.delay);
    }
}
