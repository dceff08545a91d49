//! Secondary enrichment tasks run after the primary fetch.
//!
//! Every task reads an immutable snapshot of the aggregate and returns an
//! [`EnrichmentOutput`] naming the one field it fills. The orchestrator is
//! the only writer: outputs are applied after the tasks are joined, so no
//! locking is needed. A failing or panicking task only leaves its field
//! untouched.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use skycast_core::{DataSourceMode, EnrichmentSettings};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::aggregate::AggregateWeather;
use crate::cache::SnapshotSink;
use crate::error::{EnrichmentError, FetchError};
use crate::fetch::WeatherSource;
use crate::insights::derive_insights;
use crate::types::{AlertRecord, EnvironmentalConditions, Location, WeatherInsights};

/// What a finished enrichment contributes. Each variant owns one field.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutput {
    /// Merged into `alerts` by id
    SupplementalAlerts(Vec<AlertRecord>),
    /// Stored in `environmental`
    Environmental(EnvironmentalConditions),
    /// Stored in `insights`
    Insights(WeatherInsights),
    /// Stored in `persisted_at`
    Persisted(DateTime<Utc>),
}

/// A secondary, non-essential augmentation of the aggregate.
#[async_trait]
pub trait Enrichment: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    /// Any error is logged and contained by the orchestrator.
    async fn run(
        &self,
        snapshot: &AggregateWeather,
        location: &Location,
    ) -> Result<EnrichmentOutput, EnrichmentError>;
}

/// Air quality / UV provider used by [`EnvironmentalEnrichment`].
#[async_trait]
pub trait EnvironmentalSource: Send + Sync {
    /// # Errors
    /// Returns a classified [`FetchError`] when the provider call fails.
    async fn fetch_environmental(
        &self,
        location: &Location,
    ) -> Result<EnvironmentalConditions, FetchError>;
}

/// Pulls alerts from an additional hazard feed.
pub struct SupplementalAlertsEnrichment {
    source: Arc<dyn WeatherSource>,
}

impl SupplementalAlertsEnrichment {
    pub fn new(source: Arc<dyn WeatherSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Enrichment for SupplementalAlertsEnrichment {
    fn name(&self) -> &'static str {
        "supplemental_alerts"
    }

    async fn run(
        &self,
        _snapshot: &AggregateWeather,
        location: &Location,
    ) -> Result<EnrichmentOutput, EnrichmentError> {
        let payload = self.source.fetch(location).await?;
        let alerts = payload.alerts.ok_or_else(|| {
            EnrichmentError::NoData(format!("{} returned no alert list", self.source.name()))
        })?;
        Ok(EnrichmentOutput::SupplementalAlerts(alerts))
    }
}

pub struct EnvironmentalEnrichment {
    source: Arc<dyn EnvironmentalSource>,
}

impl EnvironmentalEnrichment {
    pub fn new(source: Arc<dyn EnvironmentalSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Enrichment for EnvironmentalEnrichment {
    fn name(&self) -> &'static str {
        "environmental"
    }

    async fn run(
        &self,
        _snapshot: &AggregateWeather,
        location: &Location,
    ) -> Result<EnrichmentOutput, EnrichmentError> {
        let conditions = self.source.fetch_environmental(location).await?;
        Ok(EnrichmentOutput::Environmental(conditions))
    }
}

/// Derives headline, trend and peak precipitation from the merged data.
#[derive(Debug, Default)]
pub struct InsightsEnrichment;

#[async_trait]
impl Enrichment for InsightsEnrichment {
    fn name(&self) -> &'static str {
        "insights"
    }

    async fn run(
        &self,
        snapshot: &AggregateWeather,
        _location: &Location,
    ) -> Result<EnrichmentOutput, EnrichmentError> {
        derive_insights(snapshot)
            .map(EnrichmentOutput::Insights)
            .ok_or_else(|| EnrichmentError::NoData("nothing to derive insights from".into()))
    }
}

/// Hands the snapshot to the persistence layer.
pub struct PersistenceEnrichment {
    sink: Arc<dyn SnapshotSink>,
}

impl PersistenceEnrichment {
    pub fn new(sink: Arc<dyn SnapshotSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Enrichment for PersistenceEnrichment {
    fn name(&self) -> &'static str {
        "persistence"
    }

    async fn run(
        &self,
        snapshot: &AggregateWeather,
        _location: &Location,
    ) -> Result<EnrichmentOutput, EnrichmentError> {
        if !snapshot.has_data() {
            return Err(EnrichmentError::NoData("refusing to persist an empty snapshot".into()));
        }
        self.sink.store(snapshot).await?;
        Ok(EnrichmentOutput::Persisted(Utc::now()))
    }
}

type EnrichmentTask = JoinHandle<Result<EnrichmentOutput, EnrichmentError>>;

/// In-flight enrichment tasks, by name.
///
/// Dropping the handles without awaiting them aborts the tasks.
pub struct EnrichmentHandles {
    tasks: Vec<(&'static str, EnrichmentTask)>,
}

impl EnrichmentHandles {
    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for EnrichmentHandles {
    fn drop(&mut self) {
        for (_, task) in &self.tasks {
            task.abort();
        }
    }
}

/// Collaborators the configured enrichments need.
#[derive(Default)]
pub struct EnrichmentCollaborators {
    pub alerts_source: Option<Arc<dyn WeatherSource>>,
    pub environmental_source: Option<Arc<dyn EnvironmentalSource>>,
    pub snapshot_sink: Option<Arc<dyn SnapshotSink>>,
}

/// Launches and joins the configured enrichments.
#[derive(Default)]
pub struct EnrichmentOrchestrator {
    enrichments: Vec<Arc<dyn Enrichment>>,
}

impl EnrichmentOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the enrichment set from configuration.
    ///
    /// Network-backed tasks only run in `auto` mode; insights and
    /// persistence are post-processing that run in every mode.
    pub fn from_settings(
        mode: DataSourceMode,
        settings: &EnrichmentSettings,
        collaborators: EnrichmentCollaborators,
    ) -> Self {
        let mut orchestrator = Self::new();

        if mode.is_auto() {
            if let (true, Some(source)) = (settings.supplemental_alerts, collaborators.alerts_source) {
                orchestrator = orchestrator.with(Arc::new(SupplementalAlertsEnrichment::new(source)));
            }
            if let (true, Some(source)) = (settings.environmental, collaborators.environmental_source) {
                orchestrator = orchestrator.with(Arc::new(EnvironmentalEnrichment::new(source)));
            }
        }
        if settings.insights {
            orchestrator = orchestrator.with(Arc::new(InsightsEnrichment));
        }
        if let (true, Some(sink)) = (settings.persistence, collaborators.snapshot_sink) {
            orchestrator = orchestrator.with(Arc::new(PersistenceEnrichment::new(sink)));
        }

        debug!(enrichments = ?orchestrator.names(), "Enrichment set configured");
        orchestrator
    }

    pub fn with(mut self, enrichment: Arc<dyn Enrichment>) -> Self {
        self.enrichments.push(enrichment);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.enrichments.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.enrichments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enrichments.is_empty()
    }

    /// Start every enrichment against a snapshot of `aggregate`.
    ///
    /// The task names are recorded in the aggregate's pending set until
    /// [`EnrichmentOrchestrator::await_all`] runs.
    pub fn launch(&self, aggregate: &mut AggregateWeather, location: &Location) -> EnrichmentHandles {
        let snapshot = Arc::new(aggregate.clone());
        let mut tasks = Vec::with_capacity(self.enrichments.len());

        for enrichment in &self.enrichments {
            let name = enrichment.name();
            let enrichment = Arc::clone(enrichment);
            let snapshot = Arc::clone(&snapshot);
            let location = location.clone();

            aggregate.pending_enrichments_mut().insert(name.to_string());
            let task = tokio::spawn(async move { enrichment.run(&snapshot, &location).await });
            tasks.push((name, task));
        }

        EnrichmentHandles { tasks }
    }

    /// Wait for every launched task and apply the outputs that succeeded.
    ///
    /// Never fails: errors and panics are logged and the affected field keeps
    /// its prior value. The pending set is empty on return.
    pub async fn await_all(mut handles: EnrichmentHandles, aggregate: &mut AggregateWeather) {
        let tasks = std::mem::take(&mut handles.tasks);
        let outcomes = join_all(
            tasks
                .into_iter()
                .map(|(name, task)| async move { (name, task.await) }),
        )
        .await;

        for (name, outcome) in outcomes {
            match outcome {
                Ok(Ok(output)) => {
                    debug!(enrichment = name, "Enrichment completed");
                    apply(aggregate, output);
                }
                Ok(Err(e)) => {
                    warn!(enrichment = name, error = %e, "Enrichment failed");
                }
                Err(e) if e.is_panic() => {
                    warn!(enrichment = name, "Enrichment task panicked");
                }
                Err(e) => {
                    warn!(enrichment = name, error = %e, "Enrichment task did not complete");
                }
            }
            aggregate.pending_enrichments_mut().remove(name);
        }

        aggregate.pending_enrichments_mut().clear();
    }

    /// Launch and await in one step.
    pub async fn run_all(&self, aggregate: &mut AggregateWeather, location: &Location) {
        let handles = self.launch(aggregate, location);
        Self::await_all(handles, aggregate).await;
    }
}

fn apply(aggregate: &mut AggregateWeather, output: EnrichmentOutput) {
    match output {
        EnrichmentOutput::SupplementalAlerts(alerts) => {
            let added = aggregate.merge_alerts(alerts);
            debug!(added, "Merged supplemental alerts");
        }
        EnrichmentOutput::Environmental(conditions) => aggregate.environmental = Some(conditions),
        EnrichmentOutput::Insights(insights) => aggregate.insights = Some(insights),
        EnrichmentOutput::Persisted(at) => aggregate.persisted_at = Some(at),
    }
}
