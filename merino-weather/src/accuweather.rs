//! A weather backend that uses the AccuWeather API.

use crate::{
    models::{upstream, AccuweatherLocation, CurrentConditions, Forecast, WeatherReport},
    pathfinder::{Candidate, ExploreOutcome, Pathfinder},
    BackendError, WeatherBackend,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use cadence::{Counted, StatsdClient};
use merino_cache::{CacheAdapter, CacheAsideFetcher, CacheKeyInputs, Fetched, Fresh};
use merino_settings::{AccuweatherSettings, Settings};
use merino_suggest::{Location, SetupError};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing_futures::Instrument;

/// User-Agent sent to AccuWeather.
const REQWEST_USER_AGENT: &str = concat!("merino/", env!("CARGO_PKG_VERSION"));

/// Characters escaped in values placed into a URL path. `/` and `%` are
/// included so that a value always stays a single segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Escape `value` for use as one URL path segment.
fn path_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// Builds weather reports from the AccuWeather API, caching every response.
pub struct AccuweatherBackend {
    /// The HTTP client to query AccuWeather with.
    client: reqwest::Client,

    /// The API key, sent with every request.
    api_key: String,

    /// URLs, parameter names and cache floors.
    settings: AccuweatherSettings,

    /// Resolves client locations into AccuWeather locations.
    pathfinder: Pathfinder,

    /// Caches upstream responses.
    fetcher: CacheAsideFetcher,

    /// The cache the fetcher writes to. Closed on shutdown.
    cache: Arc<dyn CacheAdapter>,

    /// The metrics client to record pipeline outcomes with.
    metrics_client: StatsdClient,
}

impl std::fmt::Debug for AccuweatherBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccuweatherBackend")
            .field("url_base", &self.settings.url_base)
            .field("pathfinder", &self.pathfinder)
            .field("fetcher", &self.fetcher)
            .finish_non_exhaustive()
    }
}

impl AccuweatherBackend {
    /// Create a backend from settings, storing responses in `cache`.
    ///
    /// # Errors
    /// Fails if no API key is configured, or the HTTP client cannot be built.
    pub fn new(
        settings: &Settings,
        cache: Arc<dyn CacheAdapter>,
        metrics_client: StatsdClient,
    ) -> Result<Self, SetupError> {
        let accuweather = settings.accuweather.clone();
        let api_key = accuweather
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                SetupError::InvalidConfiguration(anyhow!("No AccuWeather API key is configured"))
            })?;

        let client = reqwest::Client::builder()
            .connect_timeout(accuweather.connect_timeout)
            .user_agent(REQWEST_USER_AGENT)
            .build()
            .context("Unable to create the Reqwest client")
            .map_err(SetupError::Network)?;

        let fetcher = CacheAsideFetcher::new(
            cache.clone(),
            settings.cache.key_prefix.clone(),
            [accuweather.url_param_api_key.clone()],
            metrics_client.clone(),
        );

        Ok(Self {
            client,
            api_key,
            pathfinder: Pathfinder::new(&settings.pathfinder, metrics_client.clone()),
            settings: accuweather,
            fetcher,
            cache,
            metrics_client,
        })
    }

    /// The pathfinder, for inspecting and resetting learned regions.
    pub fn pathfinder(&self) -> &Pathfinder {
        &self.pathfinder
    }

    /// Describe a request to `path`, with the parameters every request carries.
    fn inputs(&self, operation: &str, path: String) -> CacheKeyInputs {
        CacheKeyInputs::new(operation, path)
            .param(&self.settings.url_param_api_key, &self.api_key)
            .param(&self.settings.url_param_language, &self.settings.language)
    }

    /// Send the request described by `inputs`, and decode the response.
    async fn request<R: DeserializeOwned>(
        &self,
        inputs: &CacheKeyInputs,
    ) -> Result<Fresh<R>, BackendError> {
        let url = format!(
            "{}{}",
            self.settings.url_base.trim_end_matches('/'),
            inputs.path()
        );
        let params: Vec<(&str, &str)> = inputs.params().collect();
        let operation = inputs.operation();

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("Requesting AccuWeather {}", operation))
            .map_err(BackendError::Upstream)?;

        let expires = response
            .headers()
            .get(reqwest::header::EXPIRES)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);

        let value = response
            .json::<R>()
            .await
            .with_context(|| format!("Parsing AccuWeather {} response", operation))
            .map_err(BackendError::Upstream)?;

        Ok(Fresh::new(value).with_expires(expires))
    }

    /// Look up the AccuWeather location for a postal code within the
    /// candidate's region.
    async fn fetch_location(
        &self,
        country: &str,
        postal_code: &str,
        candidate: Candidate,
    ) -> Result<Option<AccuweatherLocation>, BackendError> {
        let country = path_segment(country);
        let path = match &candidate.region {
            Some(region) => self
                .settings
                .url_postalcodes_region_path
                .replace("{country}", &country)
                .replace("{region}", &path_segment(region)),
            None => self
                .settings
                .url_postalcodes_path
                .replace("{country}", &country),
        };
        let inputs = self
            .inputs("locations", path)
            .param(&self.settings.url_postalcodes_param_query, postal_code);

        let fetched: Fetched<Vec<AccuweatherLocation>> = self
            .fetcher
            .fetch(&inputs, self.settings.cache.locations.ttl_floor, || {
                self.request(&inputs)
            })
            .await?;

        Ok(pick_location(fetched.value, &candidate.city))
    }

    /// Fetch the current conditions for a location key.
    async fn fetch_current_conditions(
        &self,
        location_key: &str,
    ) -> Result<Fetched<Option<CurrentConditions>>, BackendError> {
        let path = self
            .settings
            .url_current_conditions_path
            .replace("{location_key}", &path_segment(location_key));
        let inputs = self.inputs("currentconditions", path);
        self.fetcher
            .fetch(
                &inputs,
                self.settings.cache.current_conditions.ttl_floor,
                || async {
                    let fresh = self
                        .request::<Vec<upstream::CurrentConditionsResponse>>(&inputs)
                        .await?;
                    Ok::<_, BackendError>(
                        Fresh::new(upstream::current_conditions(fresh.value))
                            .with_expires(fresh.expires),
                    )
                },
            )
            .await
    }

    /// Fetch today's forecast for a location key.
    async fn fetch_forecast(
        &self,
        location_key: &str,
    ) -> Result<Fetched<Option<Forecast>>, BackendError> {
        let path = self
            .settings
            .url_forecasts_path
            .replace("{location_key}", &path_segment(location_key));
        let inputs = self.inputs("forecasts", path);
        self.fetcher
            .fetch(&inputs, self.settings.cache.forecasts.ttl_floor, || async {
                let fresh = self
                    .request::<upstream::ForecastResponse>(&inputs)
                    .await?;
                Ok::<_, BackendError>(
                    Fresh::new(upstream::forecast(fresh.value)).with_expires(fresh.expires),
                )
            })
            .await
    }

    /// Increment a pipeline outcome counter.
    fn count(&self, name: &str) {
        self.metrics_client.count(name, 1_i64).ok();
    }
}

/// Check that the location has everything needed to look up the weather.
/// Returns the country and postal code.
fn validate(location: &Location) -> Result<(&str, &str), BackendError> {
    let country = location
        .country()
        .ok_or(BackendError::MissingLocationField("country"))?;
    location
        .city()
        .ok_or(BackendError::MissingLocationField("city"))?;
    let postal_code = location
        .postal_code()
        .ok_or(BackendError::MissingLocationField("postal code"))?;
    Ok((country, postal_code))
}

/// Choose among the results of a postal code search, preferring the one named
/// like the city.
fn pick_location(results: Vec<AccuweatherLocation>, city: &str) -> Option<AccuweatherLocation> {
    let city = city.to_lowercase();
    let position = results
        .iter()
        .position(|result| result.localized_name.to_lowercase() == city)
        .unwrap_or(0);
    results.into_iter().nth(position)
}

#[async_trait]
impl WeatherBackend for AccuweatherBackend {
    async fn get_weather_report(
        &self,
        location: &Location,
    ) -> Result<Option<WeatherReport>, BackendError> {
        let (country, postal_code) = validate(location)?;
        let span = tracing::info_span!("weather-report", %country);

        async move {
            let outcome = self
                .pathfinder
                .explore(location, |candidate| {
                    self.fetch_location(country, postal_code, candidate)
                })
                .await?;

            let accuweather_location = match outcome {
                ExploreOutcome::Found(found) => found,
                ExploreOutcome::Skipped => {
                    self.count("weather.location.skipped");
                    return Ok(None);
                }
                ExploreOutcome::Exhausted => {
                    tracing::info!(
                        r#type = "weather.location.exhausted",
                        %country,
                        "No AccuWeather location found"
                    );
                    self.count("weather.location.exhausted");
                    return Ok(None);
                }
            };

            let key = accuweather_location.key.as_str();
            let (current, forecast) =
                tokio::try_join!(self.fetch_current_conditions(key), self.fetch_forecast(key))?;

            let ttl = current.ttl.min(forecast.ttl);
            match (current.value, forecast.value) {
                (Some(current_conditions), Some(forecast)) => Ok(Some(WeatherReport {
                    city_name: accuweather_location.localized_name,
                    current_conditions,
                    forecast,
                    ttl,
                })),
                _ => {
                    tracing::info!(
                        r#type = "weather.report.incomplete",
                        location_key = %accuweather_location.key,
                        "AccuWeather returned no data for part of the report"
                    );
                    self.count("weather.report.incomplete");
                    Ok(None)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        self.cache
            .close()
            .await
            .context("Closing the weather cache")
            .map_err(BackendError::Shutdown)
    }
}
