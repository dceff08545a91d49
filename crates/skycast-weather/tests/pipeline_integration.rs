//! End-to-end polls against mocked providers.
//!
//! Every provider URL points at one wiremock server; the paths keep the
//! forecast, alert and air quality endpoints apart.

use skycast_core::{Config, DataSourceMode};
use skycast_weather::{
    diff_alerts, AlertSeverity, ConfidenceLevel, Location, WeatherAggregator, WeatherCache,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn forecast_body(max_today: f64) -> serde_json::Value {
    serde_json::json!({
        "utc_offset_seconds": 0,
        "current": {
            "time": "2026-03-01T12:00",
            "temperature_2m": 52.0,
            "relative_humidity_2m": 60.0,
            "apparent_temperature": 50.0,
            "weather_code": 3,
            "wind_speed_10m": 5.0
        },
        "hourly": {
            "time": [
                "2026-03-01T12:00", "2026-03-01T13:00", "2026-03-01T14:00",
                "2026-03-01T15:00", "2026-03-01T16:00", "2026-03-01T17:00",
                "2026-03-01T18:00"
            ],
            "temperature_2m": [52.0, 53.0, 54.0, 55.0, 56.0, 57.0, 58.0],
            "precipitation_probability": [10, 10, 20, 20, 30, 30, 30],
            "weather_code": [3, 3, 3, 3, 61, 61, 61]
        },
        "daily": {
            "time": ["2026-03-01", "2026-03-02"],
            "weather_code": [3, 61],
            "temperature_2m_max": [max_today, 50.0],
            "temperature_2m_min": [40.0, 38.0],
            "precipitation_probability_max": [30, 80]
        }
    })
}

fn alert_feature(id: &str, event: &str, severity: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("https://api.weather.gov/alerts/{id}"),
        "properties": {
            "id": id,
            "event": event,
            "severity": severity,
            "urgency": "Expected",
            "description": format!("{event} for the area.")
        }
    })
}

fn alerts_body(features: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({ "type": "FeatureCollection", "features": features })
}

fn air_quality_body() -> serde_json::Value {
    serde_json::json!({ "current": { "time": "2026-03-01T12:00", "us_aqi": 35, "uv_index": 2.0 } })
}

fn config_for(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.config_dir = dir.path().to_path_buf();
    config.weather.sources.open_meteo_url = server.uri();
    config.weather.sources.nws_url = server.uri();
    config.weather.sources.air_quality_url = server.uri();
    config.weather.retry.initial_delay_secs = 0.01;
    config
}

async fn mount_json(server: &MockServer, route: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

fn home() -> Location {
    Location::new("Home", 39.7456, -97.0892)
}

#[tokio::test]
async fn test_full_poll_merges_and_enriches() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_json(&server, "/forecast", 200, forecast_body(58.0)).await;
    mount_json(
        &server,
        "/alerts/active",
        200,
        alerts_body(vec![alert_feature("urn:oid:1", "Wind Advisory", "Moderate")]),
    )
    .await;
    mount_json(&server, "/air-quality", 200, air_quality_body()).await;

    let aggregator = WeatherAggregator::from_config(&config_for(&server, &dir)).unwrap();
    let outcome = aggregator.poll(&home()).await;

    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results.iter().all(|r| r.success()));

    let aggregate = &outcome.aggregate;
    assert_eq!(aggregate.contributing_sources, vec!["open_meteo", "nws"]);
    assert_eq!(aggregate.current.as_ref().map(|c| c.temperature), Some(52.0));
    assert_eq!(aggregate.alerts.len(), 1);
    assert_eq!(aggregate.alerts[0].severity, AlertSeverity::Moderate);

    // Enrichments
    assert_eq!(aggregate.environmental.as_ref().and_then(|e| e.us_aqi), Some(35));
    let insights = aggregate.insights.as_ref().unwrap();
    assert_eq!(insights.most_severe_alert, Some(AlertSeverity::Moderate));
    assert_eq!(insights.peak_precipitation_chance, Some(30.0));
    assert!(aggregate.persisted_at.is_some());
    assert!(aggregate.pending_enrichments().is_empty());

    // Only open_meteo has a forecast
    let confidence = aggregate.forecast_confidence().unwrap();
    assert_eq!(confidence.level, ConfidenceLevel::Medium);
    assert_eq!(confidence.sources_compared, 1);

    let cached = WeatherCache::new(dir.path()).load().await.unwrap().unwrap();
    assert_eq!(cached.contributing_sources, aggregate.contributing_sources);
    assert_eq!(cached.alerts, aggregate.alerts);
}

#[tokio::test]
async fn test_failing_source_does_not_block_poll() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_json(&server, "/forecast", 200, forecast_body(58.0)).await;
    mount_json(&server, "/alerts/active", 500, serde_json::json!({})).await;
    mount_json(&server, "/air-quality", 404, serde_json::json!({})).await;

    let aggregator = WeatherAggregator::from_config(&config_for(&server, &dir)).unwrap();
    let outcome = aggregator.poll(&home()).await;

    let nws = outcome
        .results
        .iter()
        .find(|r| r.source() == "nws")
        .unwrap();
    assert!(!nws.success());
    assert!(nws.error().unwrap().contains("Gave up after 3 attempts"));

    let aggregate = &outcome.aggregate;
    assert_eq!(aggregate.contributing_sources, vec!["open_meteo"]);
    assert!(aggregate.forecast.is_some());
    assert!(aggregate.alerts.is_empty());
    // Air quality failed; the other enrichments still ran
    assert!(aggregate.environmental.is_none());
    assert!(aggregate.insights.is_some());
    assert!(aggregate.persisted_at.is_some());
}

#[tokio::test]
async fn test_single_source_mode_skips_network_enrichments() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_json(&server, "/forecast", 200, forecast_body(58.0)).await;
    Mock::given(method("GET"))
        .and(path("/air-quality"))
        .respond_with(ResponseTemplate::new(200).set_body_json(air_quality_body()))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config_for(&server, &dir);
    config.weather.data_source = DataSourceMode::OpenMeteo;

    let aggregator = WeatherAggregator::from_config(&config).unwrap();
    let outcome = aggregator.poll(&home()).await;

    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.aggregate.environmental.is_none());
    assert!(outcome.aggregate.insights.is_some());
}

#[tokio::test]
async fn test_alert_changes_between_polls() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, &dir);

    mount_json(&server, "/forecast", 200, forecast_body(58.0)).await;
    mount_json(
        &server,
        "/alerts/active",
        200,
        alerts_body(vec![
            alert_feature("urn:oid:1", "Wind Advisory", "Moderate"),
            alert_feature("urn:oid:2", "Frost Advisory", "Minor"),
        ]),
    )
    .await;
    mount_json(&server, "/air-quality", 200, air_quality_body()).await;

    let aggregator = WeatherAggregator::from_config(&config).unwrap();
    let first = aggregator.poll(&home()).await;

    let initial = diff_alerts(None, Some(first.aggregate.alerts.as_slice()));
    assert_eq!(initial.summary, "2 new alerts");

    server.reset().await;
    mount_json(&server, "/forecast", 200, forecast_body(58.0)).await;
    mount_json(
        &server,
        "/alerts/active",
        200,
        alerts_body(vec![
            alert_feature("urn:oid:3", "High Wind Warning", "Severe"),
            alert_feature("urn:oid:1", "Wind Advisory", "Extreme"),
        ]),
    )
    .await;
    mount_json(&server, "/air-quality", 200, air_quality_body()).await;

    let second = aggregator.poll(&home()).await;
    let changes = diff_alerts(
        Some(first.aggregate.alerts.as_slice()),
        Some(second.aggregate.alerts.as_slice()),
    );

    assert_eq!(changes.new_alerts.len(), 1);
    assert_eq!(changes.new_alerts[0].alert_id, "urn:oid:3");
    assert_eq!(changes.updated_alerts.len(), 1);
    assert!(changes.updated_alerts[0].is_severity_upgrade());
    assert_eq!(changes.cancelled_alerts.len(), 1);
    assert_eq!(changes.cancelled_alerts[0].title, "Frost Advisory");
    assert_eq!(
        changes.summary,
        "1 new alert, 1 updated (severity upgraded to Extreme), 1 cancelled"
    );

    let headline = &second.aggregate.insights.as_ref().unwrap().headline;
    assert_eq!(headline, "Wind Advisory in effect");
}
