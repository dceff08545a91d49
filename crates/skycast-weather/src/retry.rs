//! Retry utilities for provider calls with exponential backoff.
//!
//! Every provider client runs its requests through [`RetryExecutor`].
//! Whether a failure is retried is decided by its [`ErrorKind`]:
//! - Transient network failures (timeouts, connection resets, 5xx, 408, 429)
//!   are retried by default
//! - Permanent failures (other 4xx, unparseable payloads) are returned at once

use std::future::Future;
use std::time::Duration;

use reqwest::{Response, StatusCode};
use skycast_core::RetrySettings;

use crate::error::{ErrorKind, FetchError};

/// Default retry configuration
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied to the delay for each further retry
    pub backoff_factor: f64,
    /// Error kinds worth another attempt
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retryable: vec![ErrorKind::TransientNetwork, ErrorKind::Timeout],
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_retries,
            settings.initial_delay(),
            settings.backoff_factor,
        )
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Replace the set of error kinds that are retried
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Calculate the delay before retry number `attempt + 1`.
    ///
    /// Delays are never capped; one too large for a `Duration` saturates to
    /// `Duration::MAX`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        // initial_delay * backoff_factor^attempt
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Decide whether an error is worth another attempt
    pub fn decision(&self, error: &FetchError) -> RetryDecision {
        if self.retryable.contains(&error.kind()) {
            RetryDecision::Retry
        } else {
            RetryDecision::NoRetry
        }
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Should retry the request
    Retry,
    /// Should not retry - permanent failure
    NoRetry,
}

/// Check if a status code is retryable
pub fn is_retryable_status(status: StatusCode) -> RetryDecision {
    // 5xx server errors are retryable
    if status.is_server_error() {
        tracing::debug!("Server error ({}), will retry", status);
        return RetryDecision::Retry;
    }

    // 429 Too Many Requests - should retry with backoff
    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::debug!("Rate limited (429), will retry");
        return RetryDecision::Retry;
    }

    // 408 Request Timeout - retryable
    if status == StatusCode::REQUEST_TIMEOUT {
        tracing::debug!("Request timeout (408), will retry");
        return RetryDecision::Retry;
    }

    // Everything else, including 401/403/404, is not worth repeating
    RetryDecision::NoRetry
}

/// Turn a non-2xx response into a classified [`FetchError`].
pub fn ensure_success(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = format!("HTTP {} from {}", status, response.url().path());
    match is_retryable_status(status) {
        RetryDecision::Retry => Err(FetchError::TransientNetwork(message)),
        RetryDecision::NoRetry => Err(FetchError::Permanent(message)),
    }
}

/// Runs a fallible async operation with bounded, sequential retries.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `operation` until it succeeds, fails permanently, or runs out
    /// of retries.
    ///
    /// # Errors
    /// Returns the original error for non-retryable kinds, or
    /// [`FetchError::RetriesExhausted`] wrapping the last error once
    /// `max_retries + 1` attempts have failed.
    ///
    /// # Example
    /// ```ignore
    /// let body = executor
    ///     .execute(|| async { fetch_json(&client, &url).await })
    ///     .await?;
    /// ```
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let total_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("Request succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if self.config.decision(&error) == RetryDecision::NoRetry {
                tracing::debug!("Non-retryable error: {}", error);
                return Err(error);
            }

            if attempt >= self.config.max_retries {
                tracing::error!("All {} attempts exhausted: {}", total_attempts, error);
                return Err(FetchError::RetriesExhausted {
                    attempts: total_attempts,
                    source: Box::new(error),
                });
            }

            let delay = self.config.delay_for_attempt(attempt);
            tracing::warn!(
                "Retryable error on attempt {} of {}: {} (waiting {:?})",
                attempt + 1,
                total_attempts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
