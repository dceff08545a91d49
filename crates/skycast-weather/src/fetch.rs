//! Parallel fetch coordinator.
//!
//! Queries every configured source concurrently and turns each outcome
//! (payload, error, timeout, panic, cancellation) into a [`SourceResult`].
//! One misbehaving source never delays or fails its siblings.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::FetchError;
use crate::types::{Location, ProviderPayload, SourceResult};

/// Per-source timeout used when callers do not override it
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

/// A weather data provider.
///
/// Implementations own their wire format and retries; the coordinator
/// treats every source the same way.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Identifier carried into [`SourceResult::source`]
    fn name(&self) -> &str;

    /// Fetch whatever categories this provider supplies for `location`.
    ///
    /// # Errors
    /// Returns a classified [`FetchError`]; the coordinator records it as a
    /// failed result.
    async fn fetch(&self, location: &Location) -> Result<ProviderPayload, FetchError>;
}

/// Adapts an async closure into a [`WeatherSource`].
pub struct FnSource<F> {
    name: String,
    operation: F,
}

impl<F> FnSource<F> {
    pub fn new(name: impl Into<String>, operation: F) -> Self {
        Self {
            name: name.into(),
            operation,
        }
    }
}

#[async_trait]
impl<F, Fut> WeatherSource for FnSource<F>
where
    F: Fn(Location) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderPayload, FetchError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, location: &Location) -> Result<ProviderPayload, FetchError> {
        (self.operation)(location.clone()).await
    }
}

/// Fans a poll out to every source and collects one result per source.
#[derive(Debug, Clone)]
pub struct FetchCoordinator {
    timeout: Duration,
    cancel: CancellationToken,
}

impl Default for FetchCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_TIMEOUT)
    }
}

impl FetchCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one tied to application shutdown
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Shutdown token shared by every call on this coordinator.
    ///
    /// Cancelling it fails every in-flight fetch, and every later call fails
    /// all sources at once with "Request cancelled". To abandon a single poll
    /// and keep polling, give that poll its own coordinator through
    /// [`with_cancellation`](Self::with_cancellation) and a child token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fetch from every source using the coordinator's timeout.
    ///
    /// Returns exactly one result per source, in completion order. Callers
    /// should key results by [`SourceResult::source`].
    pub async fn fetch_all(
        &self,
        location: &Location,
        sources: &[Arc<dyn WeatherSource>],
    ) -> Vec<SourceResult> {
        let plan: Vec<_> = sources
            .iter()
            .map(|source| (Arc::clone(source), self.timeout))
            .collect();
        self.fetch_all_with_timeouts(location, &plan).await
    }

    /// Fetch from every source, each with its own timeout.
    #[instrument(skip_all, fields(location = %location.name, sources = sources.len()))]
    pub async fn fetch_all_with_timeouts(
        &self,
        location: &Location,
        sources: &[(Arc<dyn WeatherSource>, Duration)],
    ) -> Vec<SourceResult> {
        if sources.is_empty() {
            return Vec::new();
        }

        // Dropping the set aborts any task still running.
        let mut tasks = JoinSet::new();
        let mut outstanding: Vec<String> = Vec::with_capacity(sources.len());

        for (source, timeout) in sources {
            let name = source.name().to_string();
            outstanding.push(name.clone());

            let source = Arc::clone(source);
            let location = location.clone();
            let cancel = self.cancel.clone();
            let timeout = *timeout;

            tasks.spawn(async move {
                let guarded = AssertUnwindSafe(fetch_one(source, &location, timeout, &cancel))
                    .catch_unwind()
                    .await;
                guarded.unwrap_or_else(|_| {
                    warn!(source = %name, "Source task panicked");
                    SourceResult::failed(name, "Source task panicked")
                })
            });
        }

        let mut results = Vec::with_capacity(sources.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    if let Some(pos) = outstanding.iter().position(|n| n == result.source()) {
                        outstanding.swap_remove(pos);
                    }
                    results.push(result);
                }
                Err(e) => warn!("Source task did not complete: {}", e),
            }
        }

        for name in outstanding {
            results.push(SourceResult::failed(name, "Source task aborted"));
        }

        let succeeded = results.iter().filter(|r| r.success()).count();
        debug!(succeeded, total = results.len(), "Fetch fan-out complete");
        results
    }
}

async fn fetch_one(
    source: Arc<dyn WeatherSource>,
    location: &Location,
    timeout: Duration,
    cancel: &CancellationToken,
) -> SourceResult {
    let name = source.name().to_string();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        res = tokio::time::timeout(timeout, source.fetch(location)) => {
            res.unwrap_or(Err(FetchError::Timeout))
        }
    };

    match outcome {
        Ok(payload) => {
            debug!(source = %name, "Source fetch succeeded");
            SourceResult::ok(name, payload)
        }
        Err(e) => {
            warn!(source = %name, error = %e, "Source fetch failed");
            SourceResult::failed(name, e.message())
        }
    }
}
