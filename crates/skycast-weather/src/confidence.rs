//! Forecast confidence: how closely the providers agree.

use serde::{Deserialize, Serialize};

use crate::types::SourceResult;

/// Temperature spread (°F) at or below which sources agree closely
pub const HIGH_TEMP_SPREAD: f64 = 5.0;
/// Temperature spread (°F) at or below which sources agree moderately
pub const MEDIUM_TEMP_SPREAD: f64 = 10.0;
/// Precipitation-probability spread (%) for close agreement
pub const HIGH_PRECIP_SPREAD: f64 = 15.0;
/// Precipitation-probability spread (%) for moderate agreement
pub const MEDIUM_PRECIP_SPREAD: f64 = 25.0;

const RATIONALE_NO_SOURCES: &str = "No forecast sources available";
const RATIONALE_SINGLE: &str = "Based on a single forecast source";
const RATIONALE_HIGH: &str = "Sources agree on temperature and precipitation";
const RATIONALE_MEDIUM: &str = "Moderate agreement between sources";
const RATIONALE_LOW: &str = "Sources show significant disagreement on temperature or precipitation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Agreement rating attached to one aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastConfidence {
    pub level: ConfidenceLevel,
    pub rationale: String,
    pub sources_compared: usize,
}

impl ForecastConfidence {
    fn new(level: ConfidenceLevel, rationale: &str, sources_compared: usize) -> Self {
        Self {
            level,
            rationale: rationale.to_string(),
            sources_compared,
        }
    }
}

/// Rate agreement between the first forecast periods of all usable sources.
///
/// A source counts when it succeeded and its forecast's first period carries
/// a temperature or a precipitation probability.
pub fn calculate(sources: &[SourceResult]) -> ForecastConfidence {
    let first_periods: Vec<_> = sources
        .iter()
        .filter(|s| s.success())
        .filter_map(|s| s.forecast()?.first_usable_period())
        .collect();
    let n = first_periods.len();

    match n {
        0 => return ForecastConfidence::new(ConfidenceLevel::Low, RATIONALE_NO_SOURCES, 0),
        1 => return ForecastConfidence::new(ConfidenceLevel::Medium, RATIONALE_SINGLE, 1),
        _ => {}
    }

    let temps: Vec<f64> = first_periods.iter().filter_map(|p| p.temperature).collect();
    let precips: Vec<f64> = first_periods
        .iter()
        .filter_map(|p| p.precipitation_probability)
        .collect();

    let temp_spread = spread(&temps).unwrap_or(0.0);
    let precip_spread = spread(&precips);

    let level = match precip_spread {
        Some(precip_spread) => {
            if temp_spread <= HIGH_TEMP_SPREAD && precip_spread <= HIGH_PRECIP_SPREAD {
                ConfidenceLevel::High
            } else if temp_spread <= MEDIUM_TEMP_SPREAD || precip_spread <= MEDIUM_PRECIP_SPREAD {
                ConfidenceLevel::Medium
            } else {
                ConfidenceLevel::Low
            }
        }
        None => {
            if temp_spread <= HIGH_TEMP_SPREAD {
                ConfidenceLevel::High
            } else if temp_spread <= MEDIUM_TEMP_SPREAD {
                ConfidenceLevel::Medium
            } else {
                ConfidenceLevel::Low
            }
        }
    };

    tracing::debug!(n, temp_spread, ?precip_spread, ?level, "Forecast confidence computed");

    let rationale = match level {
        ConfidenceLevel::High => RATIONALE_HIGH,
        ConfidenceLevel::Medium => RATIONALE_MEDIUM,
        ConfidenceLevel::Low => RATIONALE_LOW,
    };
    ForecastConfidence::new(level, rationale, n)
}

/// max - min, when at least two values are present
fn spread(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    Some(max - min)
}
