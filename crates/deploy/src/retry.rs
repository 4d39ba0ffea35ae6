//! Bounded retries for toolchain calls.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};

/// The attempt budget used by every step unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: usize = 2;

/// How many times a toolchain call is attempted, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Delay between two attempts. Zero retries immediately.
    #[serde(default, rename = "delay_secs", with = "duration_secs")]
    pub delay: Duration,
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The attempt budget, never less than one.
    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.attempts() - 1)
    }
}

/// Every attempt of an operation failed.
#[derive(Debug)]
pub struct RetryExhausted {
    /// Name of the operation, for logs.
    pub operation: String,
    /// Number of attempts made.
    pub attempts: usize,
    /// The failure of the last attempt.
    pub source: anyhow::Error,
}

/// Run `operation` until it succeeds or the policy's attempt budget is spent.
///
/// Attempts are strictly sequential. The value of the first successful attempt is
/// returned as is; failures of earlier attempts are dropped.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.attempts();
    let attempt = AtomicUsize::new(0);

    let result = (|| {
        let current = attempt.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(operation, attempt = current, max_attempts, "Attempting...");
        f()
    })
    .retry(policy.backoff())
    .notify(|err: &anyhow::Error, delay: Duration| {
        tracing::warn!(
            operation,
            attempt = attempt.load(Ordering::SeqCst),
            max_attempts,
            ?delay,
            error = %format!("{err:#}"),
            "Attempt failed, retrying"
        );
    })
    .await;

    let attempts = attempt.load(Ordering::SeqCst);

    match result {
        Ok(value) => {
            tracing::info!(operation, attempts, "Succeeded");
            Ok(value)
        }
        Err(source) => {
            tracing::error!(
                operation,
                attempts,
                error = %format!("{source:#}"),
                "All attempts failed"
            );
            Err(RetryExhausted {
                operation: operation.to_string(),
                attempts,
                source,
            })
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
