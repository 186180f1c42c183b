//! Tools for running tests

use crate::utils::{accuweather::AccuweatherMock, logging::LogWatcher, metrics::MetricsWatcher};
use merino_settings::Settings;
use merino_weather::{AccuweatherBackend, WeatherService};
use std::{future::Future, sync::Arc};
use tracing_futures::Instrument;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt};

/// Run a test with a fully configured weather service.
///
/// AccuWeather is replaced by a mock server listening on a port assigned
/// arbitrarily by the OS. The test settings are loaded, pointed at the mock,
/// and then passed to `settings_changer` for any test specific changes.
///
/// A suite of tools will be passed to the test function in the form of an
/// instance of [`TestingTools`]. It includes the service under test, the mock
/// upstream, and watchers that can make assertions about the logs and metrics
/// that were emitted.
///
/// # Example
///
/// ```no_run
/// # use merino_integration_tests::{merino_test, TestingTools};
/// #[tokio::test]
/// async fn a_test() {
///     merino_test(
///         |settings| settings.debug = false,
///         |TestingTools { weather_service, mut log_watcher, .. }| async move {
///             assert!(true) // Test goes here
///         }
///     ).await
/// }
/// ```
///
/// # Panics
/// May panic if tests could not be set up correctly.
pub async fn merino_test<FSettings, FTest, Fut>(
    settings_changer: FSettings,
    test: FTest,
) -> Fut::Output
where
    FSettings: FnOnce(&mut Settings),
    FTest: FnOnce(TestingTools) -> Fut,
    Fut: Future,
{
    let test_span = tracing::info_span!("merino_test");

    // Set up a mock server for AccuWeather to talk to
    let accuweather_mock = AccuweatherMock::start().await;

    // Load settings
    let url_base = accuweather_mock.base_url();
    let settings = Settings::load_for_tests(move |settings| {
        settings.accuweather.url_base = url_base;
        settings_changer(settings);
    });

    // Set up logging
    let log_watcher = LogWatcher::default();
    let log_watcher_writer = log_watcher.make_writer();

    let env_filter: tracing_subscriber::EnvFilter = (&settings.logging.levels).into();
    let tracing_subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(move || log_watcher_writer.clone()),
        )
        .with(tracing_subscriber::fmt::layer().pretty().with_test_writer());

    let _tracing_subscriber_guard = tracing::subscriber::set_default(tracing_subscriber);

    // Setup metrics
    let (metrics_watcher, metrics_client) = MetricsWatcher::new_with_client();

    // Wire the service the way the binary does
    let cache = merino_cache::make_adapter(&settings)
        .await
        .expect("Could not set up the cache");
    let backend = Arc::new(
        AccuweatherBackend::new(&settings, cache, metrics_client.clone())
            .expect("Could not set up AccuWeather"),
    );
    let weather_service = WeatherService::new(backend.clone(), &settings, metrics_client)
        .expect("Could not set up the weather service");

    let test_tools = TestingTools {
        weather_service,
        backend,
        accuweather_mock,
        log_watcher,
        metrics_watcher,
        settings,
    };

    test(test_tools).instrument(test_span).await
}

/// A set of tools for tests, including the service under test, the mock
/// upstream, and helpers to inspect logs and metrics.
///
/// This struct is marked as `non_exhaustive`, meaning that any destructuring of
/// it will require including `..`, even if all present items are named. This
/// makes adding tools in the future easier, since old tests won't need to be
/// rewritten to account for the added tools.
#[non_exhaustive]
pub struct TestingTools {
    /// The service under test, behind the `weather` circuit breaker.
    pub weather_service: WeatherService,

    /// The backend inside [`weather_service`](Self::weather_service), for
    /// inspecting the pathfinder.
    pub backend: Arc<AccuweatherBackend>,

    /// The mock AccuWeather server the backend is configured to use. Does not
    /// contain mock responses, any needed must be added.
    pub accuweather_mock: AccuweatherMock,

    /// To make assertions about logs.
    pub log_watcher: LogWatcher,

    /// To make assertions about metrics.
    pub metrics_watcher: MetricsWatcher,

    /// The settings the service was built from.
    pub settings: Settings,
}
