#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! # Merino Settings
//!
//! Configuration is specified in several ways, with later methods overriding earlier ones.
//!
//! 1. A base configuration checked into the repository, in `config/base.yaml`.
//!    This provides the default values for most settings.
//! 2. Per-environment configuration files in the `config` directory. The
//!    environment is selected using the environment variable `MERINO_ENV`. The
//!    settings for that environment are then loaded from `config/${env}.yaml`, if
//!    it exists. The default environment is "development". A "production"
//!    environment is also provided.
//! 3. A local configuration file not checked into the repository, at
//!    `config/local.yaml`. This file is in `.gitignore` and is safe to use for
//!    local configuration and secrets if desired.
//! 4. Environment variables that begin with `MERINO_` and have a separator for
//!    `__`. For example, `Settings::accuweather::api_key` can be controlled from
//!    the environment variable `MERINO_ACCUWEATHER__API_KEY`.
//!
//! Tests should use `Settings::load_for_tests` which only reads from
//! `config/base.yaml`, `config/test.yaml`, and `config/local_test.yaml` (if it
//! exists). It does not read from environment variables.
//!
//! Configuration files are canonically YAML files. However, any format supported
//! by the [config] crate can be used, including JSON and TOML. To choose another
//! format, simply use a different extension for your file, like
//! `config/local.toml`.

mod accuweather;
mod circuit_breaker;
mod logging;
mod pathfinder;

pub use crate::{
    accuweather::{AccuweatherCacheSettings, AccuweatherSettings, CacheKindSettings},
    circuit_breaker::CircuitBreakerSettings,
    logging::{DirectiveWrapper, LogFormat, LoggingSettings},
    pathfinder::{CityCorrection, PathfinderSettings, RegionStrategy, SkipEntry, StrategyEntry},
};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The integration point name of the weather backend.
pub const WEATHER_INTEGRATION: &str = "weather";

/// Top level settings object for Merino.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[doc(inline)]
pub struct Settings {
    /// The environment Merino is running in. Should only be set with the
    /// `MERINO_ENV` environment variable.
    pub env: String,

    /// Enable additional features to debug the application. This should not be
    /// set to true in production environments.
    pub debug: bool,

    /// Logging settings.
    pub logging: LoggingSettings,

    /// Metrics settings.
    pub metrics: MetricsSettings,

    /// Settings for the connection to Redis.
    pub redis: RedisSettings,

    /// Which cache backs the integrations, and how keys are named.
    pub cache: CacheSettings,

    /// Circuit breaker settings, keyed by integration point name (such as
    /// `weather`).
    pub circuit_breakers: HashMap<String, CircuitBreakerSettings>,

    /// Settings for the AccuWeather upstream.
    pub accuweather: AccuweatherSettings,

    /// Settings for resolving locations into upstream location keys.
    pub pathfinder: PathfinderSettings,
}

/// Settings for the statsd metrics sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// The host to send metrics to. If `None`, metrics are discarded.
    pub sink_host: Option<String>,

    /// The port to send metrics to.
    pub sink_port: u16,

    /// The prefix added to every metric name.
    pub prefix: String,
}

/// Settings for Redis.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedisSettings {
    /// The URL to connect to Redis at. Example: `redis://127.0.0.1/0`.
    /// Required when the `redis` cache backend is selected.
    pub url: Option<String>,
}

/// The kind of cache that backs the integrations.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Entries are stored in Redis.
    Redis,
    /// Entries are stored in the memory of this process.
    Memory,
    /// Nothing is cached. Every fetch goes to the upstream.
    None,
}

/// Settings for the cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Which cache backend to use.
    pub backend: CacheBackend,

    /// Prepended to every cache key, so that several deployments can share one
    /// Redis server.
    pub key_prefix: String,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// # Errors
    /// If any of the configured values are invalid, or if any of the required
    /// configuration files are missing.
    pub fn load() -> Result<Self, ConfigError> {
        let merino_env = std::env::var("MERINO_ENV").unwrap_or_else(|_| "development".to_string());

        let settings: Self = Config::builder()
            // Start off with the base config.
            .add_source(File::with_name("./config/base"))
            // Merge in an environment specific config.
            .set_override("env", merino_env.as_str())?
            .add_source(File::with_name(&format!("config/{}", merino_env)).required(false))
            // Add a local configuration file that is `.gitignore`ed.
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables that start with "MERINO_" and have "__" to
            // separate levels. For example, `MERINO_REDIS__URL` maps to
            // `Settings::redis::url`.
            .add_source(Environment::with_prefix("MERINO").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from configuration files for tests.
    ///
    /// `changer` can modify the settings before they are validated.
    ///
    /// # Panics
    /// If the test configuration files are missing or invalid.
    pub fn load_for_tests<F: FnOnce(&mut Self)>(changer: F) -> Self {
        let mut settings: Self = Config::builder()
            // Start off with the base config.
            .add_source(File::with_name("../config/base"))
            // Merge in test specific config.
            .set_override("env", "test")
            .expect("Could not set env for tests")
            .add_source(File::with_name("../config/test"))
            // Add a local configuration file that is `.gitignore`ed.
            .add_source(File::with_name("../config/local_test").required(false))
            .build()
            .expect("Could not load settings for tests")
            .try_deserialize()
            .expect("Could not convert settings");

        changer(&mut settings);
        settings
            .validate()
            .expect("Test settings are not valid");
        settings
    }

    /// Check the constraints that serde can't express.
    ///
    /// # Errors
    /// Returns a message naming the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, breaker) in &self.circuit_breakers {
            breaker
                .validate()
                .map_err(|msg| ConfigError::Message(format!("circuit_breakers.{}: {}", name, msg)))?;
        }

        if self.cache.backend == CacheBackend::Redis && self.redis.url.is_none() {
            return Err(ConfigError::Message(
                "redis.url is required when cache.backend is `redis`".to_string(),
            ));
        }

        self.accuweather
            .validate()
            .map_err(|msg| ConfigError::Message(format!("accuweather: {}", msg)))?;

        Ok(())
    }

    /// Get the circuit breaker settings for an integration point.
    ///
    /// # Errors
    /// If no circuit breaker is configured for `name`.
    pub fn circuit_breaker(&self, name: &str) -> Result<&CircuitBreakerSettings, ConfigError> {
        self.circuit_breakers
            .get(name)
            .ok_or_else(|| ConfigError::NotFound(format!("circuit_breakers.{}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheBackend, RegionStrategy, Settings, WEATHER_INTEGRATION};
    use std::time::Duration;

    #[test]
    fn test_settings_load() {
        let settings = Settings::load_for_tests(|_| ());
        assert_eq!(settings.env, "test");
        assert_eq!(settings.cache.backend, CacheBackend::Memory);
        assert_eq!(
            settings.accuweather.api_key.as_deref(),
            Some("test-api-key")
        );
    }

    #[test]
    fn weather_circuit_breaker_is_configured() {
        let settings = Settings::load_for_tests(|_| ());
        let breaker = settings
            .circuit_breaker(WEATHER_INTEGRATION)
            .expect("no weather breaker");
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.recovery_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn missing_circuit_breaker_is_an_error() {
        let settings = Settings::load_for_tests(|_| ());
        assert!(settings.circuit_breaker("flights").is_err());
    }

    #[test]
    fn country_codes_keep_their_case() {
        let settings = Settings::load_for_tests(|_| ());
        assert_eq!(
            settings.pathfinder.strategy_table().get("IT"),
            Some(&RegionStrategy::LeastSpecific)
        );
        assert!(settings.pathfinder.excluded_countries.contains("GB"));
    }

    #[test]
    #[should_panic(expected = "Test settings are not valid")]
    fn redis_backend_requires_a_url() {
        Settings::load_for_tests(|settings| {
            settings.cache.backend = CacheBackend::Redis;
            settings.redis.url = None;
        });
    }

    #[test]
    #[should_panic(expected = "Test settings are not valid")]
    fn zero_failure_threshold_is_invalid() {
        Settings::load_for_tests(|settings| {
            if let Some(breaker) = settings.circuit_breakers.get_mut(WEATHER_INTEGRATION) {
                breaker.failure_threshold = 0;
            }
        });
    }
}
