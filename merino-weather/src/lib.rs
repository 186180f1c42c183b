#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Weather reports for client locations, from AccuWeather.
//!
//! A report is built in stages: the location is validated, the
//! [`Pathfinder`] resolves it to an AccuWeather location key, and current
//! conditions and the forecast for that key are fetched concurrently. Every
//! upstream response goes through the cache, and the whole pipeline runs
//! behind the `weather` circuit breaker in [`WeatherService`].

mod accuweather;
mod models;
mod pathfinder;
mod service;

pub use crate::{
    accuweather::AccuweatherBackend,
    models::{AccuweatherLocation, CurrentConditions, Forecast, Temperature, WeatherReport},
    pathfinder::{Candidate, ExploreOutcome, Pathfinder},
    service::WeatherService,
};

use async_trait::async_trait;
use merino_cache::InvalidFreshnessHint;
use merino_suggest::Location;
use thiserror::Error;

/// A source of weather reports.
#[async_trait]
pub trait WeatherBackend: Send + Sync {
    /// Get the weather for `location`.
    ///
    /// `Ok(None)` means the location could not be resolved, or the upstream
    /// had no data for it.
    ///
    /// # Errors
    /// Fails if the location is incomplete, or the upstream could not be used.
    async fn get_weather_report(
        &self,
        location: &Location,
    ) -> Result<Option<WeatherReport>, BackendError>;

    /// Release the backend's resources.
    async fn shutdown(&self) -> Result<(), BackendError>;
}

/// Errors that may occur while building a weather report.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The location lacks a field needed to look up the weather.
    #[error("The location has no {0}")]
    MissingLocationField(&'static str),

    /// The upstream could not be reached, returned an error status, or sent a
    /// response that could not be understood.
    #[error("The upstream request failed: {0}")]
    Upstream(#[source] anyhow::Error),

    /// The upstream sent a freshness hint that could not be parsed.
    #[error(transparent)]
    InvalidFreshnessHint(#[from] InvalidFreshnessHint),

    /// The cache could not be released.
    #[error("Shutting down failed: {0}")]
    Shutdown(#[source] anyhow::Error),
}

impl BackendError {
    /// Whether the error says something about the upstream's health, and
    /// should count toward opening the circuit breaker.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::InvalidFreshnessHint(_))
    }
}

#[cfg(test)]
mod tests {
    use super::BackendError;

    #[test]
    fn only_upstream_errors_count_as_failures() {
        assert!(BackendError::Upstream(anyhow::anyhow!("503")).is_upstream_failure());
        assert!(!BackendError::MissingLocationField("postal code").is_upstream_failure());
        assert!(!BackendError::Shutdown(anyhow::anyhow!("closed")).is_upstream_failure());
    }

    #[test]
    fn missing_fields_are_named() {
        assert_eq!(
            BackendError::MissingLocationField("postal code").to_string(),
            "The location has no postal code"
        );
    }
}
