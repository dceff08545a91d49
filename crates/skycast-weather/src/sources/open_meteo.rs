//! Open-Meteo forecast API: current conditions, daily and hourly forecasts.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use skycast_core::SOURCE_OPEN_METEO;
use tracing::instrument;

use super::endpoint;
use crate::error::FetchError;
use crate::fetch::WeatherSource;
use crate::retry::{ensure_success, RetryExecutor};
use crate::types::{
    CurrentConditions, Forecast, ForecastPeriod, HourlyForecast, HourlyPeriod, Location,
    ProviderPayload, WeatherCondition,
};

const CURRENT_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,apparent_temperature,weather_code,wind_speed_10m";
const HOURLY_FIELDS: &str = "temperature_2m,precipitation_probability,weather_code";
const DAILY_FIELDS: &str =
    "weather_code,temperature_2m_max,temperature_2m_min,precipitation_probability_max";
const FORECAST_DAYS: u8 = 7;
const FORECAST_HOURS: u8 = 24;
const LOCAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    utc_offset_seconds: i64,
    current: Option<CurrentBlock>,
    hourly: Option<HourlyBlock>,
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    time: Option<String>,
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    weather_code: Option<i32>,
    wind_speed_10m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<i32>>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    time: Vec<String>,
    #[serde(default)]
    weather_code: Vec<Option<i32>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
}

impl ForecastResponse {
    fn into_payload(self) -> ProviderPayload {
        let offset = self.utc_offset_seconds;
        ProviderPayload {
            current: self.current.and_then(|c| c.into_conditions(offset)),
            forecast: self.daily.map(DailyBlock::into_forecast),
            hourly_forecast: self.hourly.map(HourlyBlock::into_hourly),
            alerts: None,
        }
    }
}

impl CurrentBlock {
    fn into_conditions(self, utc_offset_seconds: i64) -> Option<CurrentConditions> {
        let observed_at = self
            .time
            .as_deref()
            .and_then(|t| local_to_utc(t, utc_offset_seconds))
            .unwrap_or_else(Utc::now);

        Some(CurrentConditions {
            temperature: self.temperature_2m?,
            feels_like: self.apparent_temperature,
            humidity: self.relative_humidity_2m.map(|h| h.round().clamp(0.0, 100.0) as u8),
            wind_speed: self.wind_speed_10m,
            condition: WeatherCondition::from_wmo_code(self.weather_code.unwrap_or_default()),
            observed_at,
        })
    }
}

impl HourlyBlock {
    fn into_hourly(self) -> HourlyForecast {
        let periods = self
            .time
            .iter()
            .enumerate()
            .filter_map(|(i, time)| {
                let time = NaiveDateTime::parse_from_str(time, LOCAL_TIME_FORMAT).ok()?;
                let temperature = self.temperature_2m.get(i).copied().flatten()?;
                Some(HourlyPeriod {
                    time,
                    temperature,
                    precipitation_probability: self.precipitation_probability.get(i).copied().flatten(),
                    condition: WeatherCondition::from_wmo_code(
                        self.weather_code.get(i).copied().flatten().unwrap_or_default(),
                    ),
                })
            })
            .collect();
        HourlyForecast { periods }
    }
}

impl DailyBlock {
    fn into_forecast(self) -> Forecast {
        let periods = self
            .time
            .iter()
            .enumerate()
            .map(|(i, day)| {
                let date = day.parse::<NaiveDate>().ok();
                ForecastPeriod {
                    name: period_name(i, date),
                    date,
                    temperature: self.temperature_2m_max.get(i).copied().flatten(),
                    temperature_low: self.temperature_2m_min.get(i).copied().flatten(),
                    precipitation_probability: self
                        .precipitation_probability_max
                        .get(i)
                        .copied()
                        .flatten(),
                    condition: self
                        .weather_code
                        .get(i)
                        .copied()
                        .flatten()
                        .map(WeatherCondition::from_wmo_code),
                }
            })
            .collect();
        Forecast { periods }
    }
}

/// Open-Meteo reports local wall-clock times alongside the zone's offset.
fn local_to_utc(local: &str, utc_offset_seconds: i64) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(local, LOCAL_TIME_FORMAT)
        .ok()
        .map(|t| t.and_utc() - Duration::seconds(utc_offset_seconds))
}

fn period_name(index: usize, date: Option<NaiveDate>) -> String {
    match (index, date) {
        (0, _) => "Today".to_string(),
        (1, _) => "Tomorrow".to_string(),
        (_, Some(date)) => date.weekday().to_string(),
        (i, None) => format!("Day {}", i + 1),
    }
}

/// Forecast provider backed by the Open-Meteo API. Temperatures in °F.
#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    client: Client,
    base_url: String,
    retry: RetryExecutor,
}

impl OpenMeteoSource {
    pub fn new(client: Client, base_url: impl Into<String>, retry: RetryExecutor) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            retry,
        }
    }

    #[instrument(skip(self), fields(location = %location.name), level = "debug")]
    async fn request(&self, location: &Location) -> Result<ForecastResponse, FetchError> {
        let url = endpoint(&self.base_url, "forecast");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
                ("hourly", HOURLY_FIELDS.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("temperature_unit", "fahrenheit".to_string()),
                ("wind_speed_unit", "mph".to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", FORECAST_DAYS.to_string()),
                ("forecast_hours", FORECAST_HOURS.to_string()),
            ])
            .send()
            .await?;

        Ok(ensure_success(response)?.json().await?)
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoSource {
    fn name(&self) -> &str {
        SOURCE_OPEN_METEO
    }

    async fn fetch(&self, location: &Location) -> Result<ProviderPayload, FetchError> {
        let body = self.retry.execute(|| self.request(location)).await?;
        Ok(body.into_payload())
    }
}
