//! The weather integration point, as seen by the rest of Merino.

use crate::{BackendError, WeatherBackend, WeatherReport};
use cadence::StatsdClient;
use merino_circuit_breaker::CircuitBreaker;
use merino_settings::{Settings, WEATHER_INTEGRATION};
use merino_suggest::{Location, SetupError};
use std::sync::Arc;

/// Serves weather reports from a backend, behind a circuit breaker.
///
/// While the breaker is open, the backend is not called and no report is
/// returned.
pub struct WeatherService {
    /// Where reports come from.
    backend: Arc<dyn WeatherBackend>,

    /// Guards the backend. Falls back to "no report".
    breaker: CircuitBreaker<Option<WeatherReport>, BackendError>,
}

impl std::fmt::Debug for WeatherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherService")
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

impl WeatherService {
    /// Wrap `backend` with the breaker configured for the weather
    /// integration point.
    ///
    /// # Errors
    /// Fails if no breaker is configured for weather.
    pub fn new(
        backend: Arc<dyn WeatherBackend>,
        settings: &Settings,
        metrics_client: StatsdClient,
    ) -> Result<Self, SetupError> {
        let breaker_settings = settings
            .circuit_breaker(WEATHER_INTEGRATION)
            .map_err(|error| SetupError::InvalidConfiguration(error.into()))?;
        let breaker = CircuitBreaker::new(
            WEATHER_INTEGRATION,
            breaker_settings,
            None,
            BackendError::is_upstream_failure,
            metrics_client,
        );
        Ok(Self { backend, breaker })
    }

    /// Get the weather for `location`.
    ///
    /// # Errors
    /// Returns the backend's error, unless the breaker is open.
    pub async fn get_weather_report(
        &self,
        location: &Location,
    ) -> Result<Option<WeatherReport>, BackendError> {
        self.breaker
            .call(|| self.backend.get_weather_report(location))
            .await
    }

    /// Get the weather for `location`, logging any error and treating it as
    /// "no report".
    pub async fn suggest(&self, location: &Location) -> Option<WeatherReport> {
        match self.get_weather_report(location).await {
            Ok(report) => report,
            Err(BackendError::MissingLocationField(field)) => {
                tracing::debug!(
                    r#type = "weather.location.incomplete",
                    %field,
                    "Location cannot be used for weather"
                );
                None
            }
            Err(error) => {
                tracing::error!(
                    r#type = "weather.report.error",
                    %error,
                    "Could not get a weather report"
                );
                None
            }
        }
    }

    /// The breaker guarding the backend.
    pub fn breaker(&self) -> &CircuitBreaker<Option<WeatherReport>, BackendError> {
        &self.breaker
    }

    /// Release the backend's resources.
    ///
    /// # Errors
    /// Returns the backend's error.
    pub async fn shutdown(&self) -> Result<(), BackendError> {
        self.backend.shutdown().await
    }
}
