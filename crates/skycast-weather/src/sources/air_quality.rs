//! Open-Meteo air quality API (US AQI and UV index).

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use super::endpoint;
use crate::enrichment::EnvironmentalSource;
use crate::error::FetchError;
use crate::retry::{ensure_success, RetryExecutor};
use crate::types::{EnvironmentalConditions, Location};

#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    current: Option<AirQualityCurrent>,
}

#[derive(Debug, Deserialize)]
struct AirQualityCurrent {
    us_aqi: Option<f64>,
    uv_index: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OpenMeteoAirQuality {
    client: Client,
    base_url: String,
    retry: RetryExecutor,
}

impl OpenMeteoAirQuality {
    pub fn new(client: Client, base_url: impl Into<String>, retry: RetryExecutor) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            retry,
        }
    }

    #[instrument(skip(self), fields(location = %location.name), level = "debug")]
    async fn request(&self, location: &Location) -> Result<AirQualityResponse, FetchError> {
        let url = endpoint(&self.base_url, "air-quality");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                ("current", "us_aqi,uv_index".to_string()),
            ])
            .send()
            .await?;

        Ok(ensure_success(response)?.json().await?)
    }
}

#[async_trait]
impl EnvironmentalSource for OpenMeteoAirQuality {
    async fn fetch_environmental(
        &self,
        location: &Location,
    ) -> Result<EnvironmentalConditions, FetchError> {
        let body = self.retry.execute(|| self.request(location)).await?;
        let current = body
            .current
            .ok_or_else(|| FetchError::Permanent("air quality response had no current block".into()))?;

        Ok(EnvironmentalConditions {
            us_aqi: current.us_aqi.map(|aqi| aqi.round().max(0.0) as u32),
            uv_index: current.uv_index,
            observed_at: Utc::now(),
        })
    }
}
