//! A mock AccuWeather server with canned responses.

use httpmock::{Method::GET, Mock, MockServer};
use serde_json::{json, Value};

/// The `Expires` value used when a test does not care about freshness.
const FAR_FUTURE: &str = "Fri, 01 Jan 2100 00:00:00 GMT";

/// Wraps a [`MockServer`] with helpers for the AccuWeather endpoints used by
/// the weather backend. Every helper returns the [`Mock`], so tests can check
/// how often it was hit.
pub struct AccuweatherMock {
    /// The wrapped server.
    server: MockServer,
}

impl AccuweatherMock {
    /// Start a server on an arbitrary port.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start_async().await,
        }
    }

    /// The URL to configure as `accuweather.url_base`.
    pub fn base_url(&self) -> String {
        self.server.base_url()
    }

    /// The wrapped server, to add mocks the helpers don't cover.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Answer a postal code search within `region` (or the whole country, if
    /// `None`) with the given `(key, name)` results.
    pub async fn locations(
        &self,
        country: &str,
        region: Option<&str>,
        postal_code: &str,
        results: &[(&str, &str)],
    ) -> Mock<'_> {
        let path = match region {
            Some(region) => format!("/locations/v1/postalcodes/{}/{}/search.json", country, region),
            None => format!("/locations/v1/postalcodes/{}/search.json", country),
        };
        let body: Vec<Value> = results
            .iter()
            .map(|(key, name)| json!({"Key": key, "LocalizedName": name}))
            .collect();
        let postal_code = postal_code.to_string();
        self.server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(path)
                    .query_param("q", postal_code)
                    .query_param("apikey", "test-api-key");
                then.status(200)
                    .header("Expires", FAR_FUTURE)
                    .json_body(Value::Array(body));
            })
            .await
    }

    /// Answer the current conditions request for `location_key`.
    pub async fn current_conditions(
        &self,
        location_key: &str,
        summary: &str,
        celsius: f64,
        expires: &str,
    ) -> Mock<'_> {
        let body = json!([{
            "LocalObservationDateTime": "2022-10-21T15:34:00-04:00",
            "WeatherText": summary,
            "WeatherIcon": 6,
            "HasPrecipitation": false,
            "Temperature": {
                "Metric": {"Value": celsius, "Unit": "C", "UnitType": 17},
                "Imperial": {"Value": celsius * 9.0 / 5.0 + 32.0, "Unit": "F", "UnitType": 18}
            },
            "Link": format!("https://www.accuweather.com/en/current-weather/{}", location_key)
        }]);
        let path = format!("/currentconditions/v1/{}.json", location_key);
        let expires = expires.to_string();
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(200)
                    .header("Expires", expires)
                    .json_body(body);
            })
            .await
    }

    /// Answer the forecast request for `location_key`, with temperatures in
    /// Fahrenheit.
    pub async fn forecast(
        &self,
        location_key: &str,
        headline: &str,
        (low, high): (f64, f64),
        expires: &str,
    ) -> Mock<'_> {
        let body = json!({
            "Headline": {
                "Text": headline,
                "Link": format!("https://www.accuweather.com/en/daily-weather-forecast/{}", location_key)
            },
            "DailyForecasts": [{
                "Temperature": {
                    "Minimum": {"Value": low, "Unit": "F", "UnitType": 18},
                    "Maximum": {"Value": high, "Unit": "F", "UnitType": 18}
                }
            }]
        });
        let path = format!("/forecasts/v1/daily/1day/{}.json", location_key);
        let expires = expires.to_string();
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(200)
                    .header("Expires", expires)
                    .json_body(body);
            })
            .await
    }

    /// Answer every request with `status`.
    pub async fn fail_everything(&self, status: u16) -> Mock<'_> {
        self.server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(status);
            })
            .await
    }

    /// Register the responses for a whole report on `location_key`, fresh
    /// far into the future.
    pub async fn report(&self, location_key: &str) -> (Mock<'_>, Mock<'_>) {
        (
            self.current_conditions(location_key, "Mostly cloudy", 15.5, FAR_FUTURE)
                .await,
            self.forecast(location_key, "Pleasant Saturday", (52.0, 70.0), FAR_FUTURE)
                .await,
        )
    }
}
