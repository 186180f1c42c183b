//! # Testing strategies
//!
//! There are two major testing strategies used in this repository: unit tests,
//! and integration tests.
//!
//! Unit tests appear close to the code they are testing, in `#[cfg(test)]`
//! modules. Upstream responses are served by [`httpmock`][] servers, metrics
//! are captured with cadence's `SpyMetricSink`, and anything timing related
//! runs on Tokio's paused clock.
//!
//! Wiring the crates together is covered by
//! [`merino-integration-tests`][test-crate], which builds a weather service
//! from test settings, points it at a mock upstream, and hands the test a set
//! of tools to inspect logs and metrics.
//!
//! [httpmock]: https://docs.rs/httpmock
//! [test-crate]: ../../../merino_integration_tests/
//!
//! ```ignore
//! #[tokio::test]
//! async fn reports_are_cached() {
//!     merino_test(
//!         |_| (),
//!         |TestingTools { weather_service, accuweather_mock, .. }| async move {
//!             // Set up mocks on `accuweather_mock`, then call
//!             // `weather_service.suggest(..)`.
//!         },
//!     )
//!     .await
//! }
//! ```
//!
//! For more details, see the documentation of the `merino-integration-tests`
//! crate.
