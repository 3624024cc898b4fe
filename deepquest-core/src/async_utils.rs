//! Async utilities and patterns
//!
//! Retry logic, timeout wrapping, and the shared rate limiter that caps
//! simultaneous in-flight model and retrieval calls across a run.

use crate::error::{DeepquestError, DeepquestResult, ErrorContext};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: usize,
    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// One retry after the first attempt; the policy reasoning calls use
    pub fn single_retry() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 500,
            ..Self::default()
        }
    }
}

/// Retry an async operation with exponential backoff
pub async fn retry_async<F, T, E>(
    operation: F,
    config: RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> BoxFuture<'static, Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %err,
                        "Operation failed after all retry attempts"
                    );
                    return Err(err);
                }

                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %err,
                    delay_ms = delay,
                    "Operation failed, retrying"
                );

                let actual_delay = if config.jitter {
                    let jitter_factor = 0.1;
                    let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
                    ((delay as f64) * (1.0 + jitter)) as u64
                } else {
                    delay
                };

                sleep(Duration::from_millis(actual_delay)).await;

                delay = ((delay as f64) * config.backoff_multiplier) as u64;
                delay = delay.min(config.max_delay_ms);
            }
        }
    }
}

/// Timeout wrapper for async operations
pub async fn with_timeout<F, T>(
    future: F,
    timeout_ms: u64,
    operation_name: &str,
) -> DeepquestResult<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(DeepquestError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_suggestion("Increase timeout duration")
                .with_suggestion("Check network connectivity"),
        }),
    }
}

/// Rate limiter for model and retrieval calls
#[derive(Debug)]
pub struct RateLimiter {
    permits: Arc<tokio::sync::Semaphore>,
    min_interval: Duration,
    last_request: Arc<tokio::sync::Mutex<Option<tokio::time::Instant>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(max_concurrent: usize, min_interval_ms: u64) -> Self {
        Self {
            permits: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
            min_interval: Duration::from_millis(min_interval_ms),
            last_request: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Acquire a permit and enforce the minimum call interval
    pub async fn acquire(&self) -> DeepquestResult<RateLimitGuard> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DeepquestError::Internal {
                message: format!("Failed to acquire rate limit permit: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("rate_limiter").with_operation("acquire"),
            })?;

        if !self.min_interval.is_zero() {
            let mut last_request = self.last_request.lock().await;
            if let Some(last) = *last_request {
                let elapsed = last.elapsed();
                if elapsed < self.min_interval {
                    let sleep_duration = self.min_interval - elapsed;
                    debug!(
                        sleep_ms = sleep_duration.as_millis(),
                        "Rate limiting: sleeping to enforce minimum interval"
                    );
                    sleep(sleep_duration).await;
                }
            }
            *last_request = Some(tokio::time::Instant::now());
        }

        Ok(RateLimitGuard { _permit: permit })
    }
}

/// RAII guard for rate limiter permits
pub struct RateLimitGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
