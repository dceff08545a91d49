//! On-disk cache of the most recent aggregate.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::aggregate::AggregateWeather;
use crate::error::EnrichmentError;

const CACHE_FILE: &str = "weather_cache.json";

/// Destination for persisted aggregates.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// # Errors
    /// Returns an error when the snapshot could not be written.
    async fn store(&self, snapshot: &AggregateWeather) -> Result<(), EnrichmentError>;
}

/// JSON file cache in the application's config directory.
#[derive(Debug, Clone)]
pub struct WeatherCache {
    cache_path: PathBuf,
}

impl WeatherCache {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            cache_path: config_dir.join(CACHE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.cache_path
    }

    /// Write the aggregate, replacing any previous file.
    pub async fn save(&self, aggregate: &AggregateWeather) -> Result<(), EnrichmentError> {
        if let Some(parent) = self.cache_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(aggregate)?;
        let tmp = self.cache_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.cache_path).await?;

        tracing::debug!("Weather cache written to {}", self.cache_path.display());
        Ok(())
    }

    /// Read the cached aggregate, `None` when nothing has been cached yet.
    pub async fn load(&self) -> Result<Option<AggregateWeather>, EnrichmentError> {
        let content = match tokio::fs::read_to_string(&self.cache_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Like [`WeatherCache::load`], but ignores entries older than `max_age`.
    pub async fn load_fresh(&self, max_age: Duration) -> Result<Option<AggregateWeather>, EnrichmentError> {
        let cached = self.load().await?;
        Ok(cached.filter(|aggregate| Utc::now() - aggregate.fetched_at <= max_age))
    }

    pub async fn clear(&self) -> Result<(), EnrichmentError> {
        match tokio::fs::remove_file(&self.cache_path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SnapshotSink for WeatherCache {
    async fn store(&self, snapshot: &AggregateWeather) -> Result<(), EnrichmentError> {
        self.save(snapshot).await
    }
}
