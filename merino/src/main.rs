// Only overview documentation that is not relevant to one of the more specific
// crates should go here.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Developer tools for Merino's integrations, starting with weather reports
//! for Firefox Suggest.
//!
//! Merino is split into several subcrates that work in collaboration.
//!
//! - [merino-cache](../merino_cache/index.html)
//! - [merino-circuit-breaker](../merino_circuit_breaker/index.html)
//! - [merino-integration-tests](../merino_integration_tests/index.html)
//! - [merino-settings](../merino_settings/index.html)
//! - [merino-suggest](../merino_suggest/index.html)
//! - [merino-weather](../merino_weather/index.html)

mod cli;
mod docs;

use anyhow::{Context, Result};
use cadence::{NopMetricSink, StatsdClient, UdpMetricSink};
use clap::Parser;
use merino_settings::{LogFormat, Settings};
use merino_suggest::Location;
use merino_weather::{AccuweatherBackend, WeatherService};
use std::{net::UdpSocket, sync::Arc};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use crate::cli::{Cli, Command};

/// Primary entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("Loading settings")?;
    init_logging(&settings)?;
    let metrics_client = init_metrics(&settings)?;

    match cli.command {
        Command::Weather(args) => weather(&settings, metrics_client, &args.location()).await,
    }
}

/// Build the weather service the way a deployment would, look up the weather
/// for `location` and print the report.
async fn weather(
    settings: &Settings,
    metrics_client: StatsdClient,
    location: &Location,
) -> Result<()> {
    let cache = merino_cache::make_adapter(settings)
        .await
        .context("Setting up the cache")?;
    let backend = AccuweatherBackend::new(settings, cache, metrics_client.clone())
        .context("Setting up AccuWeather")?;
    let service = WeatherService::new(Arc::new(backend), settings, metrics_client)
        .context("Setting up the weather service")?;

    tracing::debug!(r#type = "cli.weather", ?location, "Looking up the weather");
    let report = service.suggest(location).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Serializing the report")?
    );

    service.shutdown().await.context("Shutting down")?;
    Ok(())
}

/// Set up logging for Merino, based on settings and the `RUST_LOG` environment variable.
fn init_logging(settings: &Settings) -> Result<()> {
    LogTracer::init()?;
    let env_filter: EnvFilter = (&settings.logging.levels).into();

    match settings.logging.format {
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::fmt::Subscriber::builder()
                .pretty()
                .with_writer(std::io::stderr)
                .finish()
                .with(env_filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::fmt::Subscriber::builder()
                .json()
                .with_writer(std::io::stderr)
                .finish()
                .with(env_filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::fmt::Subscriber::builder()
                .compact()
                .with_writer(std::io::stderr)
                .finish()
                .with(env_filter);
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

/// Build the metrics client. Metrics are discarded if no sink host is
/// configured.
fn init_metrics(settings: &Settings) -> Result<StatsdClient> {
    let prefix = settings.metrics.prefix.as_str();
    let client = match &settings.metrics.sink_host {
        Some(host) => {
            let socket = UdpSocket::bind("0.0.0.0:0").context("Binding the metrics socket")?;
            socket.set_nonblocking(true)?;
            let sink = UdpMetricSink::from((host.as_str(), settings.metrics.sink_port), socket)
                .context("Setting up the metrics sink")?;
            StatsdClient::from_sink(prefix, sink)
        }
        None => StatsdClient::from_sink(prefix, NopMetricSink),
    };
    Ok(client)
}
