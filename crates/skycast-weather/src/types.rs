use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Weather condition categories mapped from WMO codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// Convert WMO weather code to WeatherCondition
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i32) -> Self {
        match code {
            0 => Self::Clear,
            1..=2 => Self::PartlyCloudy,
            3 => Self::Cloudy,
            45 | 48 => Self::Fog,
            51 | 53 | 55 => Self::Drizzle,
            56 | 57 => Self::Sleet, // Freezing drizzle
            61 | 63 | 80 => Self::Rain,
            65 | 81 | 82 => Self::HeavyRain,
            66 | 67 => Self::Sleet, // Freezing rain
            71 | 73 | 75 | 77 | 85 | 86 => Self::Snow,
            95 | 96 | 99 => Self::Thunderstorm,
            _ => Self::Clear, // Unknown codes default to clear
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }
}

/// Geographic location a poll is made for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }
}

/// Current weather conditions (temperatures in °F)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub feels_like: Option<f64>,
    pub humidity: Option<u8>,
    pub wind_speed: Option<f64>,
    pub condition: WeatherCondition,
    pub observed_at: DateTime<Utc>,
}

/// One forecast period (a day, or a day/night half for some providers)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPeriod {
    pub name: String,
    pub date: Option<NaiveDate>,
    /// Headline temperature for the period (the high for daily periods)
    pub temperature: Option<f64>,
    pub temperature_low: Option<f64>,
    /// Probability of precipitation, 0-100
    pub precipitation_probability: Option<f64>,
    pub condition: Option<WeatherCondition>,
}

impl ForecastPeriod {
    /// A period is usable when it carries at least one comparable value.
    pub fn is_usable(&self) -> bool {
        self.temperature.is_some() || self.precipitation_probability.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Forecast {
    pub periods: Vec<ForecastPeriod>,
}

impl Forecast {
    /// The first period, if it holds something worth comparing.
    pub fn first_usable_period(&self) -> Option<&ForecastPeriod> {
        self.periods.first().filter(|p| p.is_usable())
    }
}

/// Hourly forecast entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPeriod {
    pub time: NaiveDateTime,
    pub temperature: f64,
    pub precipitation_probability: Option<f64>,
    pub condition: WeatherCondition,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub periods: Vec<HourlyPeriod>,
}

/// Hazard severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    #[default]
    Unknown,
    Minor,
    Moderate,
    Severe,
    Extreme,
}

impl AlertSeverity {
    /// Rank used for upgrade detection
    pub fn priority(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Minor => 1,
            Self::Moderate => 2,
            Self::Severe => 3,
            Self::Extreme => 4,
        }
    }

    /// Parse a provider label case-insensitively; anything unrecognized is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "minor" => Self::Minor,
            "moderate" => Self::Moderate,
            "severe" => Self::Severe,
            "extreme" => Self::Extreme,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Minor => "Minor",
            Self::Moderate => "Moderate",
            Self::Severe => "Severe",
            Self::Extreme => "Extreme",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How soon responsive action should be taken (CAP urgency)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertUrgency {
    Immediate,
    Expected,
    Future,
    Past,
    #[default]
    Unknown,
}

impl AlertUrgency {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "immediate" => Self::Immediate,
            "expected" => Self::Expected,
            "future" => Self::Future,
            "past" => Self::Past,
            _ => Self::Unknown,
        }
    }
}

/// One hazard alert, keyed by the provider-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub title: String,
    pub severity: AlertSeverity,
    pub urgency: AlertUrgency,
    pub description: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    /// SHA-256 over the descriptive content; changes when the text is revised
    pub content_hash: String,
}

impl AlertRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        severity: AlertSeverity,
        urgency: AlertUrgency,
    ) -> Self {
        let mut alert = Self {
            id: id.into(),
            title: title.into(),
            severity,
            urgency,
            description: None,
            expires: None,
            content_hash: String::new(),
        };
        alert.content_hash = alert.compute_hash();
        alert
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self.content_hash = self.compute_hash();
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self.content_hash = self.compute_hash();
        self
    }

    /// Hash of title, description and expiry.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        if let Some(description) = &self.description {
            hasher.update(description.as_bytes());
        }
        hasher.update([0u8]);
        if let Some(expires) = &self.expires {
            hasher.update(expires.to_rfc3339().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// What one provider returned: every category is optional.
///
/// Providers that only supply some categories leave the rest at `None`,
/// so `..Default::default()` covers the short forms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderPayload {
    pub current: Option<CurrentConditions>,
    pub forecast: Option<Forecast>,
    pub hourly_forecast: Option<HourlyForecast>,
    pub alerts: Option<Vec<AlertRecord>>,
}

/// One provider's outcome for one poll.
///
/// Built once through [`SourceResult::ok`] or [`SourceResult::failed`];
/// `error` is present exactly when `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    source: String,
    current: Option<CurrentConditions>,
    forecast: Option<Forecast>,
    hourly_forecast: Option<HourlyForecast>,
    alerts: Option<Vec<AlertRecord>>,
    fetch_time: DateTime<Utc>,
    success: bool,
    error: Option<String>,
}

impl SourceResult {
    pub fn ok(source: impl Into<String>, payload: ProviderPayload) -> Self {
        Self {
            source: source.into(),
            current: payload.current,
            forecast: payload.forecast,
            hourly_forecast: payload.hourly_forecast,
            alerts: payload.alerts,
            fetch_time: Utc::now(),
            success: true,
            error: None,
        }
    }

    pub fn failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            current: None,
            forecast: None,
            hourly_forecast: None,
            alerts: None,
            fetch_time: Utc::now(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn current(&self) -> Option<&CurrentConditions> {
        self.current.as_ref()
    }

    pub fn forecast(&self) -> Option<&Forecast> {
        self.forecast.as_ref()
    }

    pub fn hourly_forecast(&self) -> Option<&HourlyForecast> {
        self.hourly_forecast.as_ref()
    }

    pub fn alerts(&self) -> Option<&[AlertRecord]> {
        self.alerts.as_deref()
    }

    pub fn fetch_time(&self) -> DateTime<Utc> {
        self.fetch_time
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Air quality and UV readings from the environmental enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalConditions {
    pub us_aqi: Option<u32>,
    pub uv_index: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

/// Direction of the temperature over the coming hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureTrend {
    Rising,
    Falling,
    Steady,
}

/// Derived, display-ready observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherInsights {
    pub headline: String,
    pub temperature_trend: Option<TemperatureTrend>,
    /// Highest precipitation chance over the next 12 hourly periods
    pub peak_precipitation_chance: Option<f64>,
    pub most_severe_alert: Option<AlertSeverity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wmo_code_mapping() {
        assert_eq!(WeatherCondition::from_wmo_code(0), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_wmo_code(2), WeatherCondition::PartlyCloudy);
        assert_eq!(WeatherCondition::from_wmo_code(48), WeatherCondition::Fog);
        assert_eq!(WeatherCondition::from_wmo_code(57), WeatherCondition::Sleet);
        assert_eq!(WeatherCondition::from_wmo_code(82), WeatherCondition::HeavyRain);
        assert_eq!(WeatherCondition::from_wmo_code(86), WeatherCondition::Snow);
        assert_eq!(WeatherCondition::from_wmo_code(99), WeatherCondition::Thunderstorm);
    }

    #[test]
    fn test_wmo_code_unknown_defaults_to_clear() {
        assert_eq!(WeatherCondition::from_wmo_code(999), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_wmo_code(-1), WeatherCondition::Clear);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Unknown < AlertSeverity::Minor);
        assert!(AlertSeverity::Minor < AlertSeverity::Moderate);
        assert!(AlertSeverity::Moderate < AlertSeverity::Severe);
        assert!(AlertSeverity::Severe < AlertSeverity::Extreme);
        assert_eq!(AlertSeverity::Extreme.priority(), 4);
    }

    #[test]
    fn test_severity_parsing_is_case_insensitive() {
        assert_eq!(AlertSeverity::from_label("SEVERE"), AlertSeverity::Severe);
        assert_eq!(AlertSeverity::from_label(" minor "), AlertSeverity::Minor);
        assert_eq!(AlertSeverity::from_label("catastrophic"), AlertSeverity::Unknown);
        assert_eq!(AlertSeverity::Severe.to_string(), "Severe");
    }

    #[test]
    fn test_alert_hash_tracks_content() {
        let a = AlertRecord::new("a1", "Flood Watch", AlertSeverity::Moderate, AlertUrgency::Expected);
        let same = AlertRecord::new("a1", "Flood Watch", AlertSeverity::Moderate, AlertUrgency::Expected);
        let revised = a.clone().with_description("River cresting tonight");
        assert_eq!(a.content_hash, same.content_hash);
        assert_ne!(a.content_hash, revised.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn test_source_result_error_iff_failed() {
        let ok = SourceResult::ok("open_meteo", ProviderPayload::default());
        assert!(ok.success());
        assert!(ok.error().is_none());

        let failed = SourceResult::failed("nws", "Request timed out");
        assert!(!failed.success());
        assert_eq!(failed.error(), Some("Request timed out"));
        assert!(failed.forecast().is_none());
    }

    #[test]
    fn test_first_usable_period() {
        let empty = ForecastPeriod {
            name: "Today".into(),
            date: None,
            temperature: None,
            temperature_low: None,
            precipitation_probability: None,
            condition: None,
        };
        let forecast = Forecast {
            periods: vec![empty.clone()],
        };
        assert!(forecast.first_usable_period().is_none());

        let forecast = Forecast {
            periods: vec![ForecastPeriod {
                temperature: Some(71.0),
                ..empty
            }],
        };
        assert!(forecast.first_usable_period().is_some());
    }
}
