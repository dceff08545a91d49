//! HTTP-backed providers.

mod air_quality;
mod nws;
mod open_meteo;

pub use air_quality::OpenMeteoAirQuality;
pub use nws::NwsAlertsSource;
pub use open_meteo::OpenMeteoSource;

use std::time::Duration;

use reqwest::Client;
use skycast_core::{NetworkError, ReqwestErrorExt};

/// Build the client shared by every provider.
///
/// The request timeout is a backstop; per-source deadlines are enforced by
/// the fetch coordinator.
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<Client, NetworkError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(ReqwestErrorExt::into_network_error)
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
