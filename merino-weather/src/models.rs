//! Weather data, as served to callers and as received from AccuWeather.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::time::Duration;

/// A temperature in both scales.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    /// Degrees Celsius.
    pub c: f64,
    /// Degrees Fahrenheit.
    pub f: f64,
}

impl Temperature {
    /// A temperature given in Celsius.
    pub fn from_celsius(c: f64) -> Self {
        Self {
            c: round_tenths(c),
            f: round_tenths(c * 9.0 / 5.0 + 32.0),
        }
    }

    /// A temperature given in Fahrenheit.
    pub fn from_fahrenheit(f: f64) -> Self {
        Self {
            c: round_tenths((f - 32.0) * 5.0 / 9.0),
            f: round_tenths(f),
        }
    }
}

/// Round to one decimal place.
fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// An upstream location, as returned by the postal code search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccuweatherLocation {
    /// The key used to look up weather for the location.
    pub key: String,
    /// The location's name in the requested language.
    pub localized_name: String,
}

/// Current conditions at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// A link to more details.
    pub url: String,
    /// A short description, such as "Cloudy".
    pub summary: String,
    /// The upstream icon number.
    pub icon_id: u8,
    /// The current temperature.
    pub temperature: Temperature,
}

/// The forecast for the rest of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// A link to more details.
    pub url: String,
    /// A short description of the day.
    pub summary: String,
    /// The expected high.
    pub high: Temperature,
    /// The expected low.
    pub low: Temperature,
}

/// Everything known about the weather at a location.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// The name of the city the report is for.
    pub city_name: String,
    /// Current conditions.
    pub current_conditions: CurrentConditions,
    /// Today's forecast.
    pub forecast: Forecast,
    /// How long the report may be reused.
    #[serde_as(as = "DurationSeconds")]
    #[serde(rename = "ttl_sec")]
    pub ttl: Duration,
}

/// Response shapes of the AccuWeather API. Only the fields Merino uses are
/// listed; everything else is ignored.
pub(crate) mod upstream {
    use super::{CurrentConditions, Forecast, Temperature};
    use serde::Deserialize;

    /// One entry of the current conditions response.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub(crate) struct CurrentConditionsResponse {
        /// Link to the conditions on the AccuWeather site.
        link: String,
        /// Description of the conditions.
        weather_text: String,
        /// Icon number.
        weather_icon: u8,
        /// Temperature in both unit systems.
        temperature: MetricAndImperial,
    }

    /// A value given in both unit systems.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct MetricAndImperial {
        /// Celsius.
        metric: UnitValue,
    }

    /// A measurement and its unit.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct UnitValue {
        /// The number.
        value: f64,
        /// `C` or `F` for temperatures.
        #[serde(default)]
        unit: Option<String>,
    }

    impl UnitValue {
        /// Read the value as a temperature, defaulting to Fahrenheit when
        /// no unit is given.
        fn temperature(&self) -> Temperature {
            match self.unit.as_deref() {
                Some("C") => Temperature::from_celsius(self.value),
                _ => Temperature::from_fahrenheit(self.value),
            }
        }
    }

    /// The daily forecast response.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub(crate) struct ForecastResponse {
        /// The headline for the forecast period.
        headline: Headline,
        /// One entry per day.
        daily_forecasts: Vec<DailyForecast>,
    }

    /// A forecast headline.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Headline {
        /// Description of the period.
        text: String,
        /// Link to the forecast on the AccuWeather site.
        link: String,
    }

    /// The forecast for one day.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct DailyForecast {
        /// Expected temperatures.
        temperature: TemperatureRange,
    }

    /// A high and a low.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct TemperatureRange {
        /// The high.
        maximum: UnitValue,
        /// The low.
        minimum: UnitValue,
    }

    /// The first entry of a current conditions response, if any.
    pub(crate) fn current_conditions(
        response: Vec<CurrentConditionsResponse>,
    ) -> Option<CurrentConditions> {
        response.into_iter().next().map(|current| CurrentConditions {
            url: current.link,
            summary: current.weather_text,
            icon_id: current.weather_icon,
            temperature: Temperature::from_celsius(current.temperature.metric.value),
        })
    }

    /// Today's forecast, if the response has one.
    pub(crate) fn forecast(response: ForecastResponse) -> Option<Forecast> {
        let today = response.daily_forecasts.into_iter().next()?;
        Some(Forecast {
            url: response.headline.link,
            summary: response.headline.text,
            high: today.temperature.maximum.temperature(),
            low: today.temperature.minimum.temperature(),
        })
    }

}

#[cfg(test)]
mod tests {
    use super::{AccuweatherLocation, CurrentConditions, Forecast, Temperature, WeatherReport};
    use merino_cache::CachePayload;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// Store a value the way the backend does and read it back.
    fn through_the_cache<T: CachePayload>(value: &T) -> T {
        let bytes = value.to_cache_bytes().unwrap();
        T::from_cache_bytes(&bytes).unwrap()
    }

    fn temperature() -> impl Strategy<Value = Temperature> {
        (-800_i32..600).prop_map(|tenths| Temperature::from_celsius(f64::from(tenths) / 10.0))
    }

    fn current_conditions() -> impl Strategy<Value = CurrentConditions> {
        ("https://[a-z]{1,12}\\.com/[a-z0-9_/]{0,20}", "\\PC{0,30}", any::<u8>(), temperature())
            .prop_map(|(url, summary, icon_id, temperature)| CurrentConditions {
                url,
                summary,
                icon_id,
                temperature,
            })
    }

    fn forecast() -> impl Strategy<Value = Forecast> {
        (
            "https://[a-z]{1,12}\\.com/[a-z0-9_/]{0,20}",
            "\\PC{0,40}",
            temperature(),
            temperature(),
        )
            .prop_map(|(url, summary, high, low)| Forecast {
                url,
                summary,
                high,
                low,
            })
    }

    fn accuweather_location() -> impl Strategy<Value = AccuweatherLocation> {
        ("[0-9]{3,6}(_PC)?", "\\PC{0,30}").prop_map(|(key, localized_name)| AccuweatherLocation {
            key,
            localized_name,
        })
    }

    #[test]
    fn empty_upstream_answers_survive_the_cache() {
        let no_locations: Vec<AccuweatherLocation> = vec![];
        assert_eq!(through_the_cache(&no_locations), no_locations);
        assert_eq!(through_the_cache(&None::<CurrentConditions>), None);
        assert_eq!(through_the_cache(&None::<Forecast>), None);
    }

    #[test]
    fn cached_locations_keep_their_upstream_names() {
        let locations = vec![
            AccuweatherLocation {
                key: "49569_PC".to_string(),
                localized_name: "Toronto".to_string(),
            },
            AccuweatherLocation {
                key: "56186".to_string(),
                localized_name: "Montréal".to_string(),
            },
        ];
        let bytes = locations.to_cache_bytes().unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains(r#""LocalizedName":"Toronto""#));
        assert_eq!(through_the_cache(&locations), locations);
    }

    #[test]
    fn reports_serialize_ttl_in_seconds() {
        let report = WeatherReport {
            city_name: "Toronto".to_string(),
            current_conditions: super::CurrentConditions {
                url: "https://example.com/current".to_string(),
                summary: "Sunny".to_string(),
                icon_id: 1,
                temperature: Temperature::from_celsius(20.0),
            },
            forecast: super::Forecast {
                url: "https://example.com/forecast".to_string(),
                summary: "Sunny all day".to_string(),
                high: Temperature::from_celsius(24.0),
                low: Temperature::from_celsius(12.0),
            },
            ttl: std::time::Duration::from_secs(1800),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["ttl_sec"], 1800);
        assert_eq!(value["current_conditions"]["temperature"]["f"], 68.0);
    }

    proptest! {
        /// Cached temperatures come back exactly as they were stored.
        #[test]
        fn temperatures_survive_the_cache(celsius in -80.0_f64..60.0) {
            let temperature = Temperature::from_celsius(celsius);
            let bytes = temperature.to_cache_bytes().unwrap();
            prop_assert_eq!(Temperature::from_cache_bytes(&bytes).unwrap(), temperature);
        }

        /// Location searches come back from the cache in the same order.
        #[test]
        fn locations_survive_the_cache(
            locations in prop::collection::vec(accuweather_location(), 0..5)
        ) {
            prop_assert_eq!(through_the_cache(&locations), locations);
        }

        #[test]
        fn current_conditions_survive_the_cache(
            conditions in prop::option::of(current_conditions())
        ) {
            prop_assert_eq!(through_the_cache(&conditions), conditions);
        }

        #[test]
        fn forecasts_survive_the_cache(forecast in prop::option::of(forecast())) {
            prop_assert_eq!(through_the_cache(&forecast), forecast);
        }

        /// Converting from either scale agrees to within rounding.
        #[test]
        fn scales_agree(fahrenheit in -100.0_f64..140.0) {
            let from_f = Temperature::from_fahrenheit(fahrenheit);
            let back = Temperature::from_celsius(from_f.c);
            prop_assert!((back.f - from_f.f).abs() <= 0.2);
        }
    }
}
