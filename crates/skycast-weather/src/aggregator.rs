//! Poll pipeline: fetch, merge, enrich, rate.

use std::sync::Arc;
use std::time::Duration;

use skycast_core::{AppError, Config, SOURCE_NWS, SOURCE_OPEN_METEO};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::aggregate::AggregateWeather;
use crate::cache::WeatherCache;
use crate::confidence;
use crate::enrichment::{EnrichmentCollaborators, EnrichmentOrchestrator};
use crate::fetch::{FetchCoordinator, WeatherSource};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::sources::{http_client, NwsAlertsSource, OpenMeteoAirQuality, OpenMeteoSource};
use crate::types::{Location, SourceResult};

/// What one poll produced.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Merged, enriched and rated view; read-only from here on
    pub aggregate: AggregateWeather,
    /// One raw result per configured source
    pub results: Vec<SourceResult>,
}

/// Runs complete polls against a fixed set of sources.
pub struct WeatherAggregator {
    sources: Vec<(Arc<dyn WeatherSource>, Duration)>,
    coordinator: FetchCoordinator,
    orchestrator: EnrichmentOrchestrator,
    priority: Vec<String>,
}

impl WeatherAggregator {
    pub fn new(coordinator: FetchCoordinator, orchestrator: EnrichmentOrchestrator) -> Self {
        Self {
            sources: Vec::new(),
            coordinator,
            orchestrator,
            priority: Vec::new(),
        }
    }

    /// Add a source using the coordinator's timeout.
    pub fn with_source(self, source: Arc<dyn WeatherSource>) -> Self {
        let timeout = self.coordinator.timeout();
        self.with_source_timeout(source, timeout)
    }

    pub fn with_source_timeout(mut self, source: Arc<dyn WeatherSource>, timeout: Duration) -> Self {
        self.sources.push((source, timeout));
        self
    }

    /// Order in which sources are consulted when merging.
    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        self.priority = priority;
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|(s, _)| s.name()).collect()
    }

    pub fn enrichment_names(&self) -> Vec<&'static str> {
        self.orchestrator.names()
    }

    /// Shutdown token: cancelling it fails every fetch still in flight and
    /// every source of every later poll.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.coordinator.cancellation_token()
    }

    /// Wire sources, retry policy and enrichments from configuration.
    ///
    /// # Errors
    /// Fails when the configuration is invalid or the HTTP client cannot be
    /// built.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        config.ensure_valid()?;

        let weather = &config.weather;
        let timeout = weather.sources.timeout();
        let client = http_client(&weather.sources.user_agent, timeout)?;
        let retry = RetryExecutor::new(RetryConfig::from(&weather.retry));

        let active = weather.active_sources();
        let mut aggregator = Self::new(
            FetchCoordinator::new(timeout),
            EnrichmentOrchestrator::new(),
        )
        .with_priority(active.clone());

        for name in &active {
            let source: Arc<dyn WeatherSource> = match name.as_str() {
                SOURCE_OPEN_METEO => Arc::new(OpenMeteoSource::new(
                    client.clone(),
                    weather.sources.open_meteo_url.clone(),
                    retry.clone(),
                )),
                SOURCE_NWS => Arc::new(NwsAlertsSource::new(
                    client.clone(),
                    weather.sources.nws_url.clone(),
                    retry.clone(),
                )),
                other => {
                    warn!("Ignoring unknown weather source: {}", other);
                    continue;
                }
            };
            aggregator = aggregator.with_source(source);
        }

        // Supplemental alerts only when NWS is not already a primary source
        let alerts_source: Option<Arc<dyn WeatherSource>> = if active.iter().any(|n| n == SOURCE_NWS) {
            None
        } else {
            Some(Arc::new(NwsAlertsSource::new(
                client.clone(),
                weather.sources.nws_url.clone(),
                retry.clone(),
            )))
        };

        let collaborators = EnrichmentCollaborators {
            alerts_source,
            environmental_source: Some(Arc::new(OpenMeteoAirQuality::new(
                client,
                weather.sources.air_quality_url.clone(),
                retry,
            ))),
            snapshot_sink: Some(Arc::new(WeatherCache::new(&config.config_dir))),
        };
        aggregator.orchestrator = EnrichmentOrchestrator::from_settings(
            weather.data_source,
            &weather.enrichments,
            collaborators,
        );

        info!(
            sources = ?aggregator.source_names(),
            enrichments = ?aggregator.enrichment_names(),
            "Weather aggregator configured"
        );
        Ok(aggregator)
    }

    /// Run one full poll for `location`.
    ///
    /// Never fails: source and enrichment failures are recorded in the
    /// results and logs, and an all-failed poll yields an empty aggregate.
    #[instrument(skip(self), fields(location = %location.name))]
    pub async fn poll(&self, location: &Location) -> PollOutcome {
        let results = self
            .coordinator
            .fetch_all_with_timeouts(location, &self.sources)
            .await;

        let mut aggregate = AggregateWeather::merge(location.clone(), &results, &self.priority);
        let handles = self.orchestrator.launch(&mut aggregate, location);
        EnrichmentOrchestrator::await_all(handles, &mut aggregate).await;

        aggregate.attach_confidence(confidence::calculate(&results));

        let succeeded = results.iter().filter(|r| r.success()).count();
        info!(
            succeeded,
            total = results.len(),
            alerts = aggregate.alerts.len(),
            "Weather poll complete"
        );

        PollOutcome { aggregate, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceLevel;
    use crate::error::FetchError;
    use crate::fetch::FnSource;
    use crate::types::{Forecast, ForecastPeriod, ProviderPayload};
    use skycast_core::DataSourceMode;

    fn forecast(temp: f64) -> ProviderPayload {
        ProviderPayload {
            forecast: Some(Forecast {
                periods: vec![ForecastPeriod {
                    name: "Today".into(),
                    date: None,
                    temperature: Some(temp),
                    temperature_low: None,
                    precipitation_probability: Some(20.0),
                    condition: None,
                }],
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_poll_merges_and_rates() {
        let aggregator = WeatherAggregator::new(FetchCoordinator::default(), EnrichmentOrchestrator::new())
            .with_source(Arc::new(FnSource::new("a", |_| async { Ok::<_, FetchError>(forecast(70.0)) })))
            .with_source(Arc::new(FnSource::new("b", |_| async { Ok::<_, FetchError>(forecast(72.0)) })))
            .with_source(Arc::new(FnSource::new("c", |_| async {
                Err::<ProviderPayload, _>(FetchError::Permanent("bad key".into()))
            })))
            .with_priority(vec!["b".into(), "a".into()]);

        let outcome = aggregator.poll(&Location::new("Home", 40.0, -75.0)).await;

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.aggregate.contributing_sources, vec!["b", "a"]);
        let first = &outcome.aggregate.forecast.as_ref().unwrap().periods[0];
        assert_eq!(first.temperature, Some(72.0));

        let confidence = outcome.aggregate.forecast_confidence().unwrap();
        assert_eq!(confidence.level, ConfidenceLevel::High);
        assert_eq!(confidence.sources_compared, 2);
        assert!(outcome.aggregate.pending_enrichments().is_empty());
    }

    #[tokio::test]
    async fn test_poll_with_no_sources() {
        let aggregator = WeatherAggregator::new(FetchCoordinator::default(), EnrichmentOrchestrator::new());
        let outcome = aggregator.poll(&Location::new("Home", 40.0, -75.0)).await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.aggregate.has_data());
        assert_eq!(
            outcome.aggregate.forecast_confidence().map(|c| c.level),
            Some(ConfidenceLevel::Low)
        );
    }

    #[test]
    fn test_from_config_auto_mode() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.config_dir = dir.path().to_path_buf();

        let aggregator = WeatherAggregator::from_config(&config).unwrap();
        assert_eq!(aggregator.source_names(), vec![SOURCE_OPEN_METEO, SOURCE_NWS]);
        // NWS already feeds alerts as a primary source
        assert_eq!(
            aggregator.enrichment_names(),
            vec!["environmental", "insights", "persistence"]
        );
    }

    #[test]
    fn test_from_config_supplemental_alerts_without_nws() {
        let mut config = Config::default();
        config.weather.sources.enabled = vec![SOURCE_OPEN_METEO.to_string()];

        let aggregator = WeatherAggregator::from_config(&config).unwrap();
        assert_eq!(aggregator.source_names(), vec![SOURCE_OPEN_METEO]);
        assert_eq!(
            aggregator.enrichment_names(),
            vec!["supplemental_alerts", "environmental", "insights", "persistence"]
        );
    }

    #[test]
    fn test_from_config_single_source_mode() {
        let mut config = Config::default();
        config.weather.data_source = DataSourceMode::Nws;

        let aggregator = WeatherAggregator::from_config(&config).unwrap();
        assert_eq!(aggregator.source_names(), vec![SOURCE_NWS]);
        assert_eq!(aggregator.enrichment_names(), vec!["insights", "persistence"]);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = Config::default();
        config.weather.sources.timeout_secs = 0.0;
        assert!(matches!(
            WeatherAggregator::from_config(&config),
            Err(AppError::Config(_))
        ));
    }
}
