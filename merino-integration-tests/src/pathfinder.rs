//! Tests for resolving locations across several lookups.
#![cfg(test)]

use crate::{merino_test, TestingTools};
use merino_settings::CacheBackend;
use merino_suggest::Location;

/// A location in a country with no configured strategy, where the first
/// region geolocation reports is not the one AccuWeather indexes.
fn dublin() -> Location {
    Location {
        country: Some("IE".to_string()),
        regions: vec!["L".to_string(), "D".to_string()],
        city: Some("Dublin".to_string()),
        postal_code: Some("D02".to_string()),
        coordinates: None,
    }
}

#[tokio::test]
async fn working_regions_are_remembered() {
    merino_test(
        |settings| settings.cache.backend = CacheBackend::None,
        |TestingTools {
             weather_service,
             backend,
             accuweather_mock,
             mut log_watcher,
             ..
         }| async move {
            let province = accuweather_mock
                .locations("IE", Some("L"), "D02", &[])
                .await;
            let county = accuweather_mock
                .locations("IE", Some("D"), "D02", &[("207931", "Dublin")])
                .await;
            accuweather_mock.report("207931").await;

            assert!(weather_service.suggest(&dublin()).await.is_some());
            assert!(weather_service.suggest(&dublin()).await.is_some());

            province.assert_hits_async(1).await;
            county.assert_hits_async(2).await;
            assert_eq!(
                backend
                    .pathfinder()
                    .region_mapping_snapshot()
                    .get(&("IE".to_string(), "Dublin".to_string())),
                Some(&"D".to_string())
            );
            assert!(log_watcher.has_type("pathfinder.learned"));
        },
    )
    .await
}

#[tokio::test]
async fn excluded_countries_are_not_remembered() {
    merino_test(
        |settings| settings.cache.backend = CacheBackend::None,
        |TestingTools {
             weather_service,
             backend,
             accuweather_mock,
             ..
         }| async move {
            accuweather_mock
                .locations("CA", Some("ON"), "M5A", &[("49569_PC", "Toronto")])
                .await;
            accuweather_mock.report("49569_PC").await;

            let toronto = Location {
                country: Some("CA".to_string()),
                regions: vec!["ON".to_string()],
                city: Some("Toronto".to_string()),
                postal_code: Some("M5A".to_string()),
                coordinates: None,
            };
            assert!(weather_service.suggest(&toronto).await.is_some());

            assert!(backend.pathfinder().region_mapping_snapshot().is_empty());
        },
    )
    .await
}

#[tokio::test]
async fn countries_without_a_strategy_finally_search_the_whole_country() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             backend,
             accuweather_mock,
             ..
         }| async move {
            let province = accuweather_mock
                .locations("IE", Some("L"), "D02", &[])
                .await;
            let county = accuweather_mock
                .locations("IE", Some("D"), "D02", &[])
                .await;
            let country = accuweather_mock
                .locations("IE", None, "D02", &[("207931", "Dublin")])
                .await;
            accuweather_mock.report("207931").await;

            let report = weather_service
                .suggest(&dublin())
                .await
                .expect("no report");

            assert_eq!(report.city_name, "Dublin");
            province.assert_hits_async(1).await;
            county.assert_hits_async(1).await;
            country.assert_hits_async(1).await;
            // Nothing to remember when no region was needed.
            assert!(backend.pathfinder().region_mapping_snapshot().is_empty());
        },
    )
    .await
}
