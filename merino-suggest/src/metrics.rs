//! Additional tools for recording metrics from integrations.

use cadence::{Histogram, Histogrammed, MetricBuilder, MetricResult};
use std::time::{Duration, Instant};

/// Trait for recording timer values with additional precision.
///
/// Time data is stored as a histogram. Statistical distribution is calculated
/// by the server. Times are stored as a number of microseconds, with fractional
/// values used to represent nanoseconds.
///
/// Note that tags and histograms are a
/// [Datadog](https://docs.datadoghq.com/developers/dogstatsd/) extension to
/// Statsd and may not be supported by your server.
pub trait TimedMicros {
    /// Record a single histogram value with the given key.
    ///
    /// # Errors
    /// Returns an error if there was a problem sending the metric.
    fn time_micros(&self, key: &str, value: Duration) -> MetricResult<Histogram> {
        self.time_micros_with_tags(key, value).try_send()
    }

    /// Record a single histogram value with the given key and return a
    /// `MetricBuilder` that can be used to add tags to the metric.
    fn time_micros_with_tags<'a>(
        &'a self,
        key: &'a str,
        value: Duration,
    ) -> MetricBuilder<'_, '_, Histogram>;
}

impl<C: Histogrammed<f64>> TimedMicros for C {
    fn time_micros_with_tags<'a>(
        &'a self,
        key: &'a str,
        value: Duration,
    ) -> MetricBuilder<'_, '_, Histogram> {
        debug_assert!(key.ends_with("-us"), "timer keys end with `-us`");
        let micros = value.as_nanos() as f64 / 1000_f64;
        self.histogram_with_tags(key, micros)
    }
}

/// Measures the time between its creation and a call to [`Stopwatch::elapsed`].
///
/// Used to time upstream requests and cache fetches without threading
/// `Instant`s through every call site.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch(Instant);

impl Stopwatch {
    /// Start measuring.
    #[must_use]
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// The time since the stopwatch was started.
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}
