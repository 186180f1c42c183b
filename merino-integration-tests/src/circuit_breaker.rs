//! Tests for the circuit breaker in front of AccuWeather.
#![cfg(test)]

use crate::{merino_test, TestingTools};
use merino_circuit_breaker::CircuitState;
use merino_suggest::Location;
use std::time::Duration;

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
async fn an_unhealthy_upstream_is_left_alone() {
    merino_test(
        |_| (),
        |TestingTools {
             weather_service,
             accuweather_mock,
             mut metrics_watcher,
             ..
         }| async move {
            let everything = accuweather_mock.fail_everything(503).await;

            for _ in 0..3 {
                assert!(weather_service.get_weather_report(&toronto()).await.is_err());
            }
            assert!(matches!(
                weather_service.breaker().state(),
                CircuitState::Open { .. }
            ));

            for _ in 0..5 {
                let report = weather_service
                    .get_weather_report(&toronto())
                    .await
                    .expect("open breakers serve the fallback");
                assert_eq!(report, None);
            }

            everything.assert_hits_async(3).await;
            let name = Some(("name", "weather"));
            assert_eq!(metrics_watcher.count("circuit_breaker.fallback", name), 5.0);
            assert_eq!(metrics_watcher.last_gauge("circuit_breaker.state", name), Some(1.0));
        },
    )
    .await
}

#[tokio::test]
async fn a_successful_trial_closes_the_breaker() {
    merino_test(
        |settings| {
            if let Some(breaker) = settings.circuit_breakers.get_mut("weather") {
                breaker.recovery_timeout_sec = 0.05;
            }
        },
        |TestingTools {
             weather_service,
             accuweather_mock,
             mut metrics_watcher,
             ..
         }| async move {
            let mut outage = accuweather_mock.fail_everything(503).await;
            for _ in 0..3 {
                assert_eq!(weather_service.suggest(&toronto()).await, None);
            }
            assert!(matches!(
                weather_service.breaker().state(),
                CircuitState::Open { .. }
            ));

            outage.delete_async().await;
            accuweather_mock
                .locations("CA", Some("ON"), "M5A", &[("49569_PC", "Toronto")])
                .await;
            accuweather_mock.report("49569_PC").await;

            tokio::time::sleep(Duration::from_millis(100)).await;
            let report = weather_service.suggest(&toronto()).await;

            assert!(report.is_some());
            assert_eq!(weather_service.breaker().state(), CircuitState::Closed);
            assert_eq!(weather_service.breaker().failure_count(), 0);
            assert_eq!(
                metrics_watcher.last_gauge("circuit_breaker.state", Some(("name", "weather"))),
                Some(0.0)
            );
        },
    )
    .await
}

#[tokio::test]
async fn a_failed_trial_reopens_the_breaker() {
    merino_test(
        |settings| {
            if let Some(breaker) = settings.circuit_breakers.get_mut("weather") {
                breaker.recovery_timeout_sec = 0.05;
            }
        },
        |TestingTools {
             weather_service,
             accuweather_mock,
             ..
         }| async move {
            let everything = accuweather_mock.fail_everything(503).await;
            for _ in 0..3 {
                assert_eq!(weather_service.suggest(&toronto()).await, None);
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(weather_service.get_weather_report(&toronto()).await.is_err());

            assert!(matches!(
                weather_service.breaker().state(),
                CircuitState::Open { .. }
            ));
            everything.assert_hits_async(4).await;
        },
    )
    .await
}
