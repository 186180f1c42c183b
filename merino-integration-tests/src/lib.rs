#![warn(missing_docs, clippy::missing_docs_in_private_items)]
// None of the tests are seen by the linter, so none of the utilities are marked
// as used. But docs don't generate for the below if they are `#[cfg(test)]`.
// This is a compromise.
#![allow(dead_code)]

//! Tests for Merino that wire the crates together the way the binary does.
//!
//! Each test gets a [`WeatherService`](merino_weather::WeatherService) built
//! from the test settings, with AccuWeather replaced by a mock server. Since
//! the upstream URLs and the shape of the reports are what other systems
//! depend on, the paths and fields used here are important details.
//!
//! This is structured as a separate crate so that it produces a single test
//! binary instead of one test per file like would happen if this were
//! `merino/tests/...`. This improves compilation and test times.
//!
//! The primary tool used by tests is [`merino_test`], which creates the mock
//! server, sets up the service, and provides helpers to inspect logs and
//! metrics. It then calls the test function that is passed to it, providing
//! the above tools as an argument.
//!
//! ```no_run
//! use merino_integration_tests::{merino_test, TestingTools};
//!
//! #[tokio::test]
//! async fn incomplete_locations_have_no_weather() {
//!     merino_test(
//!         |_| (),
//!         |TestingTools { weather_service, .. }| async move {
//!             let report = weather_service.suggest(&Default::default()).await;
//!             assert_eq!(report, None);
//!         },
//!     )
//!     .await
//! }
//! ```

mod caching;
mod circuit_breaker;
mod logging;
mod pathfinder;
mod utils;
mod weather;

pub use crate::utils::{
    accuweather::AccuweatherMock,
    logging::{LogWatcher, TracingJsonEvent},
    metrics::MetricsWatcher,
    test_tools::{merino_test, TestingTools},
};
