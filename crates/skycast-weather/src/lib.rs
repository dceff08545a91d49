//! Multi-source weather aggregation for Skycast.
//!
//! Polls several providers in parallel with per-source timeouts and
//! retries, merges their answers, runs secondary enrichments, diffs hazard
//! alerts between polls and rates how much the providers agree.

pub mod aggregate;
pub mod aggregator;
pub mod alerts;
pub mod cache;
pub mod confidence;
pub mod enrichment;
pub mod error;
pub mod fetch;
pub mod insights;
pub mod retry;
pub mod sources;
pub mod types;

pub use aggregate::AggregateWeather;
pub use aggregator::{PollOutcome, WeatherAggregator};
pub use alerts::{diff as diff_alerts, AlertChange, AlertChangeKind, AlertLifecycleDiff};
pub use cache::{SnapshotSink, WeatherCache};
pub use confidence::{calculate as calculate_confidence, ConfidenceLevel, ForecastConfidence};
pub use enrichment::{
    Enrichment, EnrichmentCollaborators, EnrichmentHandles, EnrichmentOrchestrator,
    EnrichmentOutput, EnvironmentalEnrichment, EnvironmentalSource, InsightsEnrichment,
    PersistenceEnrichment, SupplementalAlertsEnrichment,
};
pub use error::{EnrichmentError, ErrorKind, FetchError};
pub use fetch::{FetchCoordinator, FnSource, WeatherSource, DEFAULT_SOURCE_TIMEOUT};
pub use retry::{RetryConfig, RetryDecision, RetryExecutor};
pub use sources::{http_client, NwsAlertsSource, OpenMeteoAirQuality, OpenMeteoSource};
pub use types::*;
