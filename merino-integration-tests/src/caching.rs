//! Tests for how upstream responses are cached.
#![cfg(test)]

use crate::{merino_test, TestingTools};
use httpmock::Method::GET;
use merino_settings::CacheBackend;
use merino_suggest::Location;
use std::time::Duration;

/// A date long gone, so the TTL floors apply.
const PAST: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Toronto, as geolocation reports it.
fn toronto() -> Location {
    Location {
        country: Some("CA".to_string()),
        regions: vec!["ON".to_string()],
        city: Some("Toronto".to_string()),
        postal_code: Some("M5A".to_string()),
        coordinates: None,
    }
}

#[tokio::test]
async fn repeated_lookups_are_served_from_the_cache() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             mut metrics_watcher,
             ..
         }| async move {
            let search = accuweather_mock
                .locations("CA", Some("ON"), "M5A", &[("49569_PC", "Toronto")])
                .await;
            let (current, forecast) = accuweather_mock.report("49569_PC").await;

            let first = weather_service.suggest(&toronto()).await;
            let second = weather_service.suggest(&toronto()).await;

            assert!(first.is_some());
            assert_eq!(
                first.map(|report| report.city_name),
                second.map(|report| report.city_name)
            );
            search.assert_hits_async(1).await;
            current.assert_hits_async(1).await;
            forecast.assert_hits_async(1).await;

            for operation in ["locations", "currentconditions", "forecasts"] {
                let tag = Some(("operation", operation));
                assert_eq!(metrics_watcher.count("cache.fetch.miss", tag), 1.0);
                assert_eq!(metrics_watcher.count("cache.fetch.hit", tag), 1.0);
            }
        },
    )
    .await
}

#[tokio::test]
async fn without_a_cache_every_lookup_goes_upstream() {
    merino_test(
        |settings| settings.cache.backend = CacheBackend::None,
        |TestingTools {
             weather_service,
             accuweather_mock,
             ..
         }| async move {
            let search = accuweather_mock
                .locations("CA", Some("ON"), "M5A", &[("49569_PC", "Toronto")])
                .await;
            let (current, forecast) = accuweather_mock.report("49569_PC").await;

            for _ in 0..2 {
                assert!(weather_service.suggest(&toronto()).await.is_some());
            }

            search.assert_hits_async(2).await;
            current.assert_hits_async(2).await;
            forecast.assert_hits_async(2).await;
        },
    )
    .await
}

#[tokio::test]
async fn stale_hints_fall_back_to_the_ttl_floors() {
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
            accuweather_mock
                .current_conditions("49569_PC", "Sunny", 20.0, PAST)
                .await;
            accuweather_mock
                .forecast("49569_PC", "Sunny all day", (50.0, 77.0), PAST)
                .await;

            let report = weather_service
                .suggest(&toronto())
                .await
                .expect("no report");

            assert_eq!(report.ttl, Duration::from_secs(1800));
        },
    )
    .await
}

#[tokio::test]
async fn missing_hints_use_the_floor_and_are_counted() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             mut metrics_watcher,
             mut log_watcher,
             ..
         }| async move {
            accuweather_mock
                .locations("CA", Some("ON"), "M5A", &[("49569_PC", "Toronto")])
                .await;
            accuweather_mock
                .server()
                .mock_async(|when, then| {
                    when.method(GET).path("/currentconditions/v1/49569_PC.json");
                    then.status(200).json_body(serde_json::json!([{
                        "WeatherText": "Sunny",
                        "WeatherIcon": 1,
                        "Temperature": {"Metric": {"Value": 20.0, "Unit": "C"}},
                        "Link": "https://www.accuweather.com/current"
                    }]));
                })
                .await;
            accuweather_mock
                .forecast("49569_PC", "Sunny all day", (50.0, 77.0), PAST)
                .await;

            let report = weather_service
                .suggest(&toronto())
                .await
                .expect("no report");

            assert_eq!(report.ttl, Duration::from_secs(1800));
            assert_eq!(
                metrics_watcher.count(
                    "cache.ttl.missing_hint",
                    Some(("operation", "currentconditions"))
                ),
                1.0
            );
            assert!(log_watcher.has_type("cache.ttl.missing_hint"));
        },
    )
    .await
}

#[tokio::test]
async fn malformed_hints_are_not_cached() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             mut log_watcher,
             ..
         }| async move {
            let search = accuweather_mock
                .locations("CA", Some("ON"), "M5A", &[("49569_PC", "Toronto")])
                .await;
            let current = accuweather_mock
                .current_conditions("49569_PC", "Sunny", 20.0, "soon, probably")
                .await;
            accuweather_mock
                .forecast("49569_PC", "Sunny all day", (50.0, 77.0), PAST)
                .await;

            assert_eq!(weather_service.suggest(&toronto()).await, None);
            assert_eq!(weather_service.suggest(&toronto()).await, None);

            // The location is fine, and stays cached.
            search.assert_hits_async(1).await;
            current.assert_hits_async(2).await;
            assert!(log_watcher.has_type("cache.ttl.invalid_hint"));
            assert!(log_watcher.has_type("weather.report.error"));
        },
    )
    .await
}
