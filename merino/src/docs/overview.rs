//! # High level overview of Merino
//!
//! This project is structured as a [Cargo Workspace][] that contains one crate
//! for each broad area of behavior. Each crate can be compiled and tested on
//! its own, and the binary crate brings them together.
//!
//! [Cargo Workspace]: https://doc.rust-lang.org/book/ch14-03-cargo-workspaces.html
//!
//! ## [`merino`](../)
//!
//! The command line tool. It loads settings, sets up logging and metrics, and
//! builds a [`WeatherService`](../../merino_weather/struct.WeatherService.html)
//! for a single lookup.
//!
//! ## [`merino-settings`](../../merino_settings/index.html)
//!
//! Defines and documents the settings of the application. Settings are loaded
//! by the binary crate and passed into the other crates to configure them.
//!
//! ## [`merino-suggest`](../../merino_suggest/index.html)
//!
//! A *domain* crate with the types shared by everything else: the client
//! [`Location`](../../merino_suggest/struct.Location.html), setup errors, cache
//! statuses and timing helpers for metrics.
//!
//! ## [`merino-cache`](../../merino_cache/index.html)
//!
//! Byte oriented cache adapters (Redis, in-memory and none), deterministic
//! cache keys, and a cache-aside fetcher that derives entry lifetimes from the
//! upstream's `Expires` header.
//!
//! ## [`merino-circuit-breaker`](../../merino_circuit_breaker/index.html)
//!
//! A three state circuit breaker that stops calling an unhealthy upstream and
//! serves a fallback until a trial call succeeds.
//!
//! ## [`merino-weather`](../../merino_weather/index.html)
//!
//! The AccuWeather integration. Resolves a location into an AccuWeather
//! location key by trying region candidates in a per-country order, then
//! fetches current conditions and the forecast concurrently.
//!
//! ## [`merino-integration-tests`](../../merino_integration_tests/index.html)
//!
//! Exercises the crates together against a mock AccuWeather server, the way
//! the binary wires them.
