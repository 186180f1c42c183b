use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::time::Duration;

/// Settings for the AccuWeather integration.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccuweatherSettings {
    /// The scheme and host of the AccuWeather API, such as
    /// `https://apidev.accuweather.com`.
    pub url_base: String,

    /// The API key. Required. Never part of a cache key.
    pub api_key: Option<String>,

    /// The name of the query parameter carrying the API key.
    pub url_param_api_key: String,

    /// The name of the query parameter carrying the response language.
    pub url_param_language: String,

    /// The language responses are requested in.
    pub language: String,

    /// Path template of the postal code search, with a `{country}` placeholder.
    pub url_postalcodes_path: String,

    /// Path template of the postal code search narrowed to one administrative
    /// region, with `{country}` and `{region}` placeholders.
    pub url_postalcodes_region_path: String,

    /// The name of the query parameter carrying the postal code.
    pub url_postalcodes_param_query: String,

    /// Path template of current conditions, with a `{location_key}` placeholder.
    pub url_current_conditions_path: String,

    /// Path template of the daily forecast, with a `{location_key}` placeholder.
    pub url_forecasts_path: String,

    /// How long to wait for a connection to the upstream.
    #[serde_as(as = "DurationSeconds")]
    #[serde(rename = "connect_timeout_sec")]
    pub connect_timeout: Duration,

    /// Cache settings, per kind of cached data.
    pub cache: AccuweatherCacheSettings,
}

/// Cache settings for each kind of data fetched from AccuWeather.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccuweatherCacheSettings {
    /// Location keys resolved from postal codes.
    pub locations: CacheKindSettings,
    /// Current conditions for a location key.
    pub current_conditions: CacheKindSettings,
    /// Daily forecasts for a location key.
    pub forecasts: CacheKindSettings,
}

/// Cache settings for one kind of data.
#[serde_as]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct CacheKindSettings {
    /// Entries are kept at least this long, even if the upstream says they
    /// expire sooner.
    #[serde_as(as = "DurationSeconds")]
    #[serde(rename = "ttl_floor_sec")]
    pub ttl_floor: Duration,
}

impl AccuweatherSettings {
    /// Check the settings that must be present for the integration to work.
    pub(crate) fn validate(&self) -> Result<(), String> {
        match self.api_key.as_deref() {
            None | Some("") => return Err("api_key is required".to_string()),
            _ => (),
        }
        if self.url_base.is_empty() {
            return Err("url_base is required".to_string());
        }
        if self.url_param_api_key.is_empty() {
            return Err("url_param_api_key is required".to_string());
        }
        for (name, template, placeholder) in [
            ("url_postalcodes_path", &self.url_postalcodes_path, "{country}"),
            (
                "url_postalcodes_region_path",
                &self.url_postalcodes_region_path,
                "{region}",
            ),
            (
                "url_current_conditions_path",
                &self.url_current_conditions_path,
                "{location_key}",
            ),
            ("url_forecasts_path", &self.url_forecasts_path, "{location_key}"),
        ] {
            if !template.contains(placeholder) {
                return Err(format!("{} must contain `{}`", name, placeholder));
            }
        }
        Ok(())
    }
}
