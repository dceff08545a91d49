use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{AppError, ConfigError};

/// Source identifier for the Open-Meteo forecast API.
pub const SOURCE_OPEN_METEO: &str = "open_meteo";
/// Source identifier for the National Weather Service alerts API.
pub const SOURCE_NWS: &str = "nws";

/// Sources this build knows how to construct.
pub const KNOWN_SOURCES: &[&str] = &[SOURCE_OPEN_METEO, SOURCE_NWS];

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory (also holds the snapshot cache)
    pub config_dir: PathBuf,

    /// Weather aggregation settings
    #[serde(default)]
    pub weather: WeatherConfig,
}

/// Which providers feed a poll.
///
/// `Auto` queries every enabled source and turns on the network-backed
/// enrichments; a named mode restricts the poll to that one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceMode {
    #[default]
    Auto,
    OpenMeteo,
    Nws,
}

impl DataSourceMode {
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u32,

    /// Source selection mode
    #[serde(default)]
    pub data_source: DataSourceMode,

    /// Provider endpoints and limits
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Retry policy applied by every provider client
    #[serde(default)]
    pub retry: RetrySettings,

    /// Secondary tasks run after the primary fetch
    #[serde(default)]
    pub enrichments: EnrichmentSettings,
}

fn default_refresh_minutes() -> u32 {
    15
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            refresh_minutes: default_refresh_minutes(),
            data_source: DataSourceMode::default(),
            sources: SourcesConfig::default(),
            retry: RetrySettings::default(),
            enrichments: EnrichmentSettings::default(),
        }
    }
}

impl WeatherConfig {
    /// Source names that take part in a poll under the current mode.
    pub fn active_sources(&self) -> Vec<String> {
        match self.data_source {
            DataSourceMode::Auto => self.sources.enabled.clone(),
            DataSourceMode::OpenMeteo => vec![SOURCE_OPEN_METEO.to_string()],
            DataSourceMode::Nws => vec![SOURCE_NWS.to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Sources queried in `auto` mode, in merge priority order
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<String>,

    /// Per-source timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    #[serde(default = "default_open_meteo_url")]
    pub open_meteo_url: String,

    #[serde(default = "default_nws_url")]
    pub nws_url: String,

    #[serde(default = "default_air_quality_url")]
    pub air_quality_url: String,

    /// Sent with every request; the NWS API rejects anonymous clients
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_enabled_sources() -> Vec<String> {
    KNOWN_SOURCES.iter().map(|s| s.to_string()).collect()
}

fn default_timeout_secs() -> f64 {
    5.0
}

fn default_open_meteo_url() -> String {
    "https://api.open-meteo.com/v1".to_string()
}

fn default_nws_url() -> String {
    "https://api.weather.gov".to_string()
}

fn default_air_quality_url() -> String {
    "https://air-quality-api.open-meteo.com/v1".to_string()
}

fn default_user_agent() -> String {
    "Skycast/0.1.0 (weather aggregation)".to_string()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_sources(),
            timeout_secs: default_timeout_secs(),
            open_meteo_url: default_open_meteo_url(),
            nws_url: default_nws_url(),
            air_quality_url: default_air_quality_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl SourcesConfig {
    /// Per-source timeout, falling back to the default for unusable values.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(default_timeout_secs()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in seconds
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,

    /// Multiplier applied to the delay after each retry
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay_secs() -> f64 {
    1.0
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_secs: default_initial_delay_secs(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.initial_delay_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_initial_delay_secs()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Merge hazard alerts from the alerts-only feed (auto mode only)
    #[serde(default = "default_true")]
    pub supplemental_alerts: bool,

    /// Fetch air quality and UV index (auto mode only)
    #[serde(default = "default_true")]
    pub environmental: bool,

    /// Derive trend and headline insights from the merged data
    #[serde(default = "default_true")]
    pub insights: bool,

    /// Write the finished snapshot to the local cache
    #[serde(default = "default_true")]
    pub persistence: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            supplemental_alerts: true,
            environmental: true,
            insights: true,
            persistence: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skycast");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self, AppError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    ///
    /// # Errors
    /// `ConfigError::NotFound` for a missing file, `ConfigError::ParseError`
    /// for malformed TOML, and `AppError::Io` for any other read failure.
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::Config(ConfigError::NotFound(path.display().to_string()))
            }
            _ => AppError::Io(e),
        })?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult), AppError> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        if !validation.warnings.is_empty() {
            for warning in &validation.warnings {
                tracing::warn!("Config warning: {}", warning);
            }
        }

        Ok((config, validation))
    }

    /// Validate and convert critical problems into a typed error
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        if self.weather.sources.user_agent.trim().is_empty() {
            return Err(ConfigError::MissingSetting(
                "weather.sources.user_agent".to_string(),
            ));
        }

        let validation = self.validate();
        if validation.is_valid() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(validation.error_summary()))
        }
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let weather = &self.weather;

        self.validate_url(
            &weather.sources.open_meteo_url,
            "weather.sources.open_meteo_url",
            &mut result,
        );
        self.validate_url(&weather.sources.nws_url, "weather.sources.nws_url", &mut result);
        self.validate_url(
            &weather.sources.air_quality_url,
            "weather.sources.air_quality_url",
            &mut result,
        );

        if weather.sources.user_agent.trim().is_empty() {
            result.add_error(
                "weather.sources.user_agent",
                "A User-Agent is required by the NWS API",
            );
        }

        if !weather.sources.timeout_secs.is_finite() || weather.sources.timeout_secs <= 0.0 {
            result.add_error(
                "weather.sources.timeout_secs",
                "Timeout must be a positive number of seconds",
            );
        } else if Duration::try_from_secs_f64(weather.sources.timeout_secs).is_err() {
            result.add_error(
                "weather.sources.timeout_secs",
                "Timeout is too large to represent",
            );
        } else if weather.sources.timeout_secs > 60.0 {
            result.add_warning(
                "weather.sources.timeout_secs",
                "Per-source timeout is more than a minute",
            );
        }

        if weather.data_source.is_auto() && weather.sources.enabled.is_empty() {
            result.add_error("weather.sources.enabled", "No sources enabled in auto mode");
        }
        for name in &weather.sources.enabled {
            if !KNOWN_SOURCES.contains(&name.as_str()) {
                result.add_warning(
                    "weather.sources.enabled",
                    format!("Unknown source '{}' will be ignored", name),
                );
            }
        }

        let retry = &weather.retry;
        if !retry.initial_delay_secs.is_finite() || retry.initial_delay_secs < 0.0 {
            result.add_error(
                "weather.retry.initial_delay_secs",
                "Initial delay must be zero or a positive number of seconds",
            );
        } else if Duration::try_from_secs_f64(retry.initial_delay_secs).is_err() {
            result.add_error(
                "weather.retry.initial_delay_secs",
                "Initial delay is too large to represent",
            );
        }
        if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
            result.add_error(
                "weather.retry.backoff_factor",
                "Backoff factor must be at least 1.0",
            );
        }
        if retry.max_retries > 10 {
            result.add_warning(
                "weather.retry.max_retries",
                "More than 10 retries may stall a poll for a long time",
            );
        }

        if weather.refresh_minutes == 0 {
            result.add_warning(
                "weather.refresh_minutes",
                "Weather refresh disabled (0 minutes)",
            );
        } else if weather.refresh_minutes > 1440 {
            result.add_warning(
                "weather.refresh_minutes",
                "Weather refresh interval is more than 24 hours",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), AppError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf, AppError> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("skycast");

        Ok(config_dir.join("config.toml"))
    }
}
