//! Shared foundation for Skycast: configuration, error types and logging setup.

pub mod config;
pub mod error;

pub use config::{
    Config, DataSourceMode, EnrichmentSettings, RetrySettings, SourcesConfig, ValidationResult,
    WeatherConfig, KNOWN_SOURCES, SOURCE_NWS, SOURCE_OPEN_METEO,
};
pub use error::{AppError, ConfigError, NetworkError, ReqwestErrorExt};

/// Initialize tracing/logging.
///
/// Honors `RUST_LOG`, defaulting to `info`. Calling it again after a
/// subscriber is installed is a no-op.
pub fn init() -> Result<(), AppError> {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Skycast core initialized");
    }
    Ok(())
}
