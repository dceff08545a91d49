//! National Weather Service active alerts (GeoJSON).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::Deserialize;
use skycast_core::SOURCE_NWS;
use tracing::instrument;

use super::endpoint;
use crate::error::FetchError;
use crate::fetch::WeatherSource;
use crate::retry::{ensure_success, RetryExecutor};
use crate::types::{AlertRecord, AlertSeverity, AlertUrgency, Location, ProviderPayload};

const GEOJSON: &str = "application/geo+json";

#[derive(Debug, Deserialize)]
struct AlertCollection {
    #[serde(default)]
    features: Vec<AlertFeature>,
}

#[derive(Debug, Deserialize)]
struct AlertFeature {
    id: Option<String>,
    properties: AlertProperties,
}

#[derive(Debug, Deserialize)]
struct AlertProperties {
    id: Option<String>,
    event: Option<String>,
    headline: Option<String>,
    severity: Option<String>,
    urgency: Option<String>,
    description: Option<String>,
    expires: Option<String>,
}

impl AlertFeature {
    fn into_record(self) -> Option<AlertRecord> {
        let props = self.properties;
        let id = props.id.or(self.id)?;
        let title = props.event.or(props.headline)?;

        let mut alert = AlertRecord::new(
            id,
            title,
            AlertSeverity::from_label(props.severity.as_deref().unwrap_or_default()),
            AlertUrgency::from_label(props.urgency.as_deref().unwrap_or_default()),
        );
        if let Some(description) = props.description {
            alert = alert.with_description(description);
        }
        if let Some(expires) = props
            .expires
            .as_deref()
            .and_then(|e| DateTime::parse_from_rfc3339(e).ok())
        {
            alert = alert.with_expires(expires.with_timezone(&Utc));
        }
        Some(alert)
    }
}

/// Alerts-only provider for US locations.
#[derive(Debug, Clone)]
pub struct NwsAlertsSource {
    client: Client,
    base_url: String,
    retry: RetryExecutor,
}

impl NwsAlertsSource {
    pub fn new(client: Client, base_url: impl Into<String>, retry: RetryExecutor) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            retry,
        }
    }

    #[instrument(skip(self), fields(location = %location.name), level = "debug")]
    async fn request(&self, location: &Location) -> Result<AlertCollection, FetchError> {
        let url = endpoint(&self.base_url, "alerts/active");
        let point = format!("{:.4},{:.4}", location.latitude, location.longitude);
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, GEOJSON)
            .query(&[("point", point)])
            .send()
            .await?;

        Ok(ensure_success(response)?.json().await?)
    }
}

#[async_trait]
impl WeatherSource for NwsAlertsSource {
    fn name(&self) -> &str {
        SOURCE_NWS
    }

    async fn fetch(&self, location: &Location) -> Result<ProviderPayload, FetchError> {
        let collection = self.retry.execute(|| self.request(location)).await?;
        let total = collection.features.len();
        let alerts: Vec<AlertRecord> = collection
            .features
            .into_iter()
            .filter_map(AlertFeature::into_record)
            .collect();

        if alerts.len() < total {
            tracing::debug!("Skipped {} alerts without id or title", total - alerts.len());
        }

        Ok(ProviderPayload {
            alerts: Some(alerts),
            ..Default::default()
        })
    }
}
