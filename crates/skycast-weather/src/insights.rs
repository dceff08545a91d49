//! Derived observations computed from an aggregate.

use crate::aggregate::AggregateWeather;
use crate::types::{AlertSeverity, HourlyPeriod, TemperatureTrend, WeatherInsights};

/// Hourly periods considered for the peak precipitation chance
pub const PRECIPITATION_WINDOW_HOURS: usize = 12;
/// Hours ahead compared against now for the temperature trend
pub const TREND_HORIZON_HOURS: usize = 6;
/// Temperature change (°F) needed to call a trend rising or falling
pub const TREND_THRESHOLD: f64 = 3.0;
/// Precipitation chance (%) at which the headline calls it likely
pub const LIKELY_PRECIPITATION: f64 = 60.0;

/// Build insights from whatever the aggregate carries.
///
/// Returns `None` when there is nothing to say.
pub fn derive_insights(aggregate: &AggregateWeather) -> Option<WeatherInsights> {
    let hourly: &[HourlyPeriod] = aggregate
        .hourly_forecast
        .as_ref()
        .map(|h| h.periods.as_slice())
        .unwrap_or_default();

    let temperature_trend = trend(aggregate.current.as_ref().map(|c| c.temperature), hourly);
    let peak_precipitation_chance = hourly
        .iter()
        .take(PRECIPITATION_WINDOW_HOURS)
        .filter_map(|p| p.precipitation_probability)
        .reduce(f64::max);
    let most_severe = aggregate
        .alerts
        .iter()
        .max_by_key(|a| a.severity.priority());

    let headline = if let Some(alert) = most_severe.filter(|a| a.severity >= AlertSeverity::Severe) {
        format!("{} in effect", alert.title)
    } else if peak_precipitation_chance.is_some_and(|p| p >= LIKELY_PRECIPITATION) {
        format!("Precipitation likely in the next {PRECIPITATION_WINDOW_HOURS} hours")
    } else if let Some(current) = &aggregate.current {
        format!("{}, {:.0}°F", current.condition.description(), current.temperature)
    } else if let Some(period) = aggregate.forecast.as_ref().and_then(|f| f.first_usable_period()) {
        match (period.condition, period.temperature) {
            (Some(condition), Some(temp)) => {
                format!("{}: {}, high {:.0}°F", period.name, condition.description(), temp)
            }
            (_, Some(temp)) => format!("{}: high {:.0}°F", period.name, temp),
            (Some(condition), None) => format!("{}: {}", period.name, condition.description()),
            (None, None) => period.name.clone(),
        }
    } else if let Some(alert) = most_severe {
        format!("{} in effect", alert.title)
    } else {
        return None;
    };

    Some(WeatherInsights {
        headline,
        temperature_trend,
        peak_precipitation_chance,
        most_severe_alert: most_severe.map(|a| a.severity),
    })
}

fn trend(now: Option<f64>, hourly: &[HourlyPeriod]) -> Option<TemperatureTrend> {
    let start = now.or_else(|| hourly.first().map(|p| p.temperature))?;
    let later = hourly
        .get(TREND_HORIZON_HOURS)
        .or_else(|| hourly.last().filter(|_| hourly.len() > 1))?
        .temperature;

    let delta = later - start;
    Some(if delta >= TREND_THRESHOLD {
        TemperatureTrend::Rising
    } else if delta <= -TREND_THRESHOLD {
        TemperatureTrend::Falling
    } else {
        TemperatureTrend::Steady
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AlertRecord, AlertUrgency, CurrentConditions, Forecast, ForecastPeriod, HourlyForecast,
        Location, WeatherCondition,
    };
    use chrono::{NaiveDate, Utc};

    fn hourly(temps: &[f64], precip: &[f64]) -> HourlyForecast {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        HourlyForecast {
            periods: temps
                .iter()
                .enumerate()
                .map(|(i, t)| HourlyPeriod {
                    time: start + chrono::Duration::hours(i as i64),
                    temperature: *t,
                    precipitation_probability: precip.get(i).copied(),
                    condition: WeatherCondition::Cloudy,
                })
                .collect(),
        }
    }

    fn base() -> AggregateWeather {
        AggregateWeather::empty(Location::new("Home", 40.0, -75.0))
    }

    #[test]
    fn test_empty_aggregate_has_no_insights() {
        assert!(derive_insights(&base()).is_none());
    }

    #[test]
    fn test_current_conditions_headline_and_rising_trend() {
        let mut aggregate = base();
        aggregate.current = Some(CurrentConditions {
            temperature: 61.4,
            feels_like: None,
            humidity: None,
            wind_speed: None,
            condition: WeatherCondition::PartlyCloudy,
            observed_at: Utc::now(),
        });
        aggregate.hourly_forecast = Some(hourly(
            &[61.0, 62.0, 63.0, 64.0, 65.0, 66.0, 67.0, 68.0],
            &[0.0, 10.0, 20.0],
        ));

        let insights = derive_insights(&aggregate).unwrap();
        assert_eq!(insights.headline, "Partly Cloudy, 61°F");
        assert_eq!(insights.temperature_trend, Some(TemperatureTrend::Rising));
        assert_eq!(insights.peak_precipitation_chance, Some(20.0));
        assert_eq!(insights.most_severe_alert, None);
    }

    #[test]
    fn test_severe_alert_takes_the_headline() {
        let mut aggregate = base();
        aggregate.hourly_forecast = Some(hourly(&[50.0, 49.0, 45.0], &[90.0]));
        aggregate.alerts = vec![
            AlertRecord::new("1", "Wind Advisory", AlertSeverity::Moderate, AlertUrgency::Expected),
            AlertRecord::new("2", "Tornado Warning", AlertSeverity::Extreme, AlertUrgency::Immediate),
        ];

        let insights = derive_insights(&aggregate).unwrap();
        assert_eq!(insights.headline, "Tornado Warning in effect");
        assert_eq!(insights.most_severe_alert, Some(AlertSeverity::Extreme));
        // Fewer than six hours: compares against the last period
        assert_eq!(insights.temperature_trend, Some(TemperatureTrend::Falling));
    }

    #[test]
    fn test_precipitation_headline() {
        let mut aggregate = base();
        aggregate.hourly_forecast = Some(hourly(&[50.0, 50.5], &[30.0, 75.0]));
        let insights = derive_insights(&aggregate).unwrap();
        assert_eq!(insights.headline, "Precipitation likely in the next 12 hours");
        assert_eq!(insights.temperature_trend, Some(TemperatureTrend::Steady));
    }

    #[test]
    fn test_forecast_only_headline() {
        let mut aggregate = base();
        aggregate.forecast = Some(Forecast {
            periods: vec![ForecastPeriod {
                name: "Tonight".into(),
                date: None,
                temperature: Some(44.0),
                temperature_low: None,
                precipitation_probability: None,
                condition: Some(WeatherCondition::Fog),
            }],
        });
        let insights = derive_insights(&aggregate).unwrap();
        assert_eq!(insights.headline, "Tonight: Fog, high 44°F");
        assert!(insights.temperature_trend.is_none());
    }
}
