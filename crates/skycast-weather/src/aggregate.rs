//! The merged, multi-source view for one location and one poll.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::ForecastConfidence;
use crate::types::{
    AlertRecord, CurrentConditions, EnvironmentalConditions, Forecast, HourlyForecast, Location,
    SourceResult, WeatherInsights,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateWeather {
    pub location: Location,
    pub current: Option<CurrentConditions>,
    pub forecast: Option<Forecast>,
    pub hourly_forecast: Option<HourlyForecast>,
    pub alerts: Vec<AlertRecord>,

    /// Written by the environmental enrichment
    pub environmental: Option<EnvironmentalConditions>,
    /// Written by the insights enrichment
    pub insights: Option<WeatherInsights>,
    /// Written by the persistence enrichment
    pub persisted_at: Option<DateTime<Utc>>,

    /// Sources that succeeded this poll
    pub contributing_sources: Vec<String>,
    pub fetched_at: DateTime<Utc>,

    #[serde(skip)]
    pending_enrichments: BTreeSet<String>,
    forecast_confidence: Option<ForecastConfidence>,
}

impl AggregateWeather {
    /// An aggregate with no data, e.g. when every source failed.
    pub fn empty(location: Location) -> Self {
        Self {
            location,
            current: None,
            forecast: None,
            hourly_forecast: None,
            alerts: Vec::new(),
            environmental: None,
            insights: None,
            persisted_at: None,
            contributing_sources: Vec::new(),
            fetched_at: Utc::now(),
            pending_enrichments: BTreeSet::new(),
            forecast_confidence: None,
        }
    }

    /// Combine source results into the best available view.
    ///
    /// Successful sources are consulted in `priority` order, then any
    /// remaining ones by name. Each category comes from the first source that
    /// supplied it. Alerts are the union of all sources, keyed by id, first
    /// occurrence kept.
    pub fn merge(location: Location, results: &[SourceResult], priority: &[String]) -> Self {
        let mut ranked: Vec<&SourceResult> = results.iter().filter(|r| r.success()).collect();
        ranked.sort_by(|a, b| {
            let rank = |r: &SourceResult| {
                priority
                    .iter()
                    .position(|p| p == r.source())
                    .unwrap_or(priority.len())
            };
            rank(*a)
                .cmp(&rank(*b))
                .then_with(|| a.source().cmp(b.source()))
        });

        let mut aggregate = Self::empty(location);
        aggregate.current = ranked.iter().find_map(|r| r.current().cloned());
        aggregate.forecast = ranked.iter().find_map(|r| r.forecast().cloned());
        aggregate.hourly_forecast = ranked.iter().find_map(|r| r.hourly_forecast().cloned());
        for result in &ranked {
            if let Some(alerts) = result.alerts() {
                aggregate.merge_alerts(alerts.iter().cloned());
            }
        }
        aggregate.contributing_sources = ranked.iter().map(|r| r.source().to_string()).collect();

        if let Some(latest) = ranked.iter().map(|r| r.fetch_time()).max() {
            aggregate.fetched_at = latest;
        }
        aggregate
    }

    /// Add alerts whose ids are not present yet. Returns how many were added.
    pub fn merge_alerts(&mut self, alerts: impl IntoIterator<Item = AlertRecord>) -> usize {
        let mut known: HashSet<String> = self.alerts.iter().map(|a| a.id.clone()).collect();
        let before = self.alerts.len();
        for alert in alerts {
            if known.insert(alert.id.clone()) {
                self.alerts.push(alert);
            }
        }
        self.alerts.len() - before
    }

    pub fn has_data(&self) -> bool {
        self.current.is_some()
            || self.forecast.is_some()
            || self.hourly_forecast.is_some()
            || !self.alerts.is_empty()
    }

    /// Names of enrichments still running; empty once they have been awaited.
    pub fn pending_enrichments(&self) -> &BTreeSet<String> {
        &self.pending_enrichments
    }

    pub(crate) fn pending_enrichments_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.pending_enrichments
    }

    pub fn forecast_confidence(&self) -> Option<&ForecastConfidence> {
        self.forecast_confidence.as_ref()
    }

    /// Attach the confidence rating. Only the first rating sticks.
    pub fn attach_confidence(&mut self, confidence: ForecastConfidence) -> bool {
        if self.forecast_confidence.is_some() {
            tracing::debug!("Forecast confidence already attached; ignoring");
            return false;
        }
        self.forecast_confidence = Some(confidence);
        true
    }
}
