//! Tests for building weather reports end to end.
#![cfg(test)]

use crate::{merino_test, TestingTools};
use merino_suggest::Location;
use pretty_assertions::assert_eq;
use serde_json::json;

/// Build a location from its parts.
fn location(country: &str, regions: &[&str], city: &str, postal_code: &str) -> Location {
    Location {
        country: Some(country.to_string()),
        regions: regions.iter().map(ToString::to_string).collect(),
        city: Some(city.to_string()),
        postal_code: Some(postal_code.to_string()),
        coordinates: None,
    }
}

#[tokio::test]
async fn reports_have_the_documented_shape() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             ..
         }| async move {
            accuweather_mock
                .locations("CA", Some("ON"), "M5A", &[("49569_PC", "Toronto")])
                .await;
            accuweather_mock.report("49569_PC").await;

            let report = weather_service
                .suggest(&location("CA", &["ON"], "Toronto", "M5A"))
                .await
                .expect("no report");
            let mut value = serde_json::to_value(&report).expect("report did not serialize");

            // The TTL depends on the clock, and is covered elsewhere.
            let ttl = value
                .as_object_mut()
                .and_then(|object| object.remove("ttl_sec"))
                .and_then(|ttl| ttl.as_u64())
                .expect("no ttl_sec");
            assert!(ttl > 1800);

            assert_eq!(
                value,
                json!({
                    "city_name": "Toronto",
                    "current_conditions": {
                        "url": "https://www.accuweather.com/en/current-weather/49569_PC",
                        "summary": "Mostly cloudy",
                        "icon_id": 6,
                        "temperature": {"c": 15.5, "f": 59.9}
                    },
                    "forecast": {
                        "url": "https://www.accuweather.com/en/daily-weather-forecast/49569_PC",
                        "summary": "Pleasant Saturday",
                        "high": {"c": 21.1, "f": 70.0},
                        "low": {"c": 11.1, "f": 52.0}
                    }
                })
            );
        },
    )
    .await
}

#[tokio::test]
async fn least_specific_countries_try_the_last_region_first() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             ..
         }| async move {
            let province = accuweather_mock
                .locations("IT", Some("MT"), "75100", &[("2557", "Matera")])
                .await;
            let region = accuweather_mock
                .locations("IT", Some("77"), "75100", &[("2557", "Matera")])
                .await;
            accuweather_mock.report("2557").await;

            let report = weather_service
                .suggest(&location("IT", &["MT", "77"], "Matera", "75100"))
                .await
                .expect("no report");

            assert_eq!(report.city_name, "Matera");
            region.assert_hits_async(1).await;
            province.assert_hits_async(0).await;
        },
    )
    .await
}

#[tokio::test]
async fn corrected_city_names_pick_the_matching_result() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             ..
         }| async move {
            accuweather_mock
                .locations(
                    "CA",
                    Some("QC"),
                    "H2X",
                    &[("1365", "Montréal-Est"), ("56186_PC", "Montréal")],
                )
                .await;
            accuweather_mock.report("56186_PC").await;

            let report = weather_service
                .suggest(&location("CA", &["QC"], "Montreal", "H2X"))
                .await
                .expect("no report");

            assert_eq!(report.city_name, "Montréal");
        },
    )
    .await
}

#[tokio::test]
async fn incomplete_locations_are_not_looked_up() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             ..
         }| async move {
            let everything = accuweather_mock.fail_everything(500).await;
            let mut no_postal_code = location("CA", &["ON"], "Toronto", "M5A");
            no_postal_code.postal_code = Some("  ".to_string());

            assert_eq!(weather_service.suggest(&no_postal_code).await, None);
            assert_eq!(weather_service.suggest(&Location::default()).await, None);

            everything.assert_hits_async(0).await;
            assert_eq!(weather_service.breaker().failure_count(), 0);
        },
    )
    .await
}

#[tokio::test]
async fn unresolvable_locations_have_no_weather() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             mut metrics_watcher,
             ..
         }| async move {
            let search = accuweather_mock
                .locations("CA", Some("ON"), "M5A", &[])
                .await;

            let report = weather_service
                .suggest(&location("CA", &["ON"], "Toronto", "M5A"))
                .await;

            assert_eq!(report, None);
            search.assert_hits_async(1).await;
            assert_eq!(metrics_watcher.count("weather.location.exhausted", None), 1.0);
        },
    )
    .await
}

#[tokio::test]
async fn skip_listed_locations_are_not_looked_up() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             mut metrics_watcher,
             ..
         }| async move {
            let everything = accuweather_mock.fail_everything(500).await;

            let report = weather_service
                .suggest(&location("CA", &["BC"], "Mount Pleasant", "V5T"))
                .await;

            assert_eq!(report, None);
            everything.assert_hits_async(0).await;
            assert_eq!(metrics_watcher.count("weather.location.skipped", None), 1.0);
        },
    )
    .await
}
