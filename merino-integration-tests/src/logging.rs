//! Tests for the events logged while serving weather.
#![cfg(test)]

use crate::{merino_test, TestingTools};
use merino_suggest::Location;
use tracing::Level;

#[tokio::test]
async fn incomplete_locations_are_logged_quietly() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             mut log_watcher,
             ..
         }| async move {
            let location = Location {
                country: Some("CA".to_string()),
                ..Location::default()
            };
            assert_eq!(weather_service.suggest(&location).await, None);

            assert!(log_watcher.has(|event| {
                event.is_type("weather.location.incomplete")
                    && event.level == Level::DEBUG
                    && event.field_contains("field", "city")
            }));
            assert!(!log_watcher.has_type("weather.report.error"));
        },
    )
    .await
}

#[tokio::test]
async fn upstream_errors_are_logged() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             mut log_watcher,
             ..
         }| async move {
            accuweather_mock.fail_everything(503).await;
            let location = Location {
                country: Some("CA".to_string()),
                regions: vec!["ON".to_string()],
                city: Some("Toronto".to_string()),
                postal_code: Some("M5A".to_string()),
                coordinates: None,
            };
            assert_eq!(weather_service.suggest(&location).await, None);

            assert!(log_watcher.has(|event| {
                event.is_type("weather.report.error")
                    && event.level == Level::ERROR
                    && event.field_contains("error", "upstream request failed")
            }));
        },
    )
    .await
}

#[tokio::test]
async fn the_breaker_logs_state_changes() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             mut log_watcher,
             ..
         }| async move {
            accuweather_mock.fail_everything(503).await;
            let location = Location {
                country: Some("CA".to_string()),
                regions: vec!["ON".to_string()],
                city: Some("Toronto".to_string()),
                postal_code: Some("M5A".to_string()),
                coordinates: None,
            };
            for _ in 0..4 {
                weather_service.suggest(&location).await;
            }

            assert!(log_watcher.has_type("circuit_breaker.state"));
            assert!(log_watcher.has_type("circuit_breaker.fallback"));
        },
    )
    .await
}
