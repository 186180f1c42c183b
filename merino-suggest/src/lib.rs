#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Domain types shared by the integrations of [Merino](../merino/index.html).
//!
//! Integrations receive a [`Location`] from the geolocation collaborator, and
//! report construction problems as [`SetupError`]s.

mod domain;
pub mod metrics;

use thiserror::Error;

pub use crate::domain::{Coordinates, Location};

/// Errors that may occur while setting up an integration.
#[derive(Debug, Error)]
#[allow(missing_docs, clippy::missing_docs_in_private_items)]
pub enum SetupError {
    #[error("This integration cannot be used with the current Merino configuration")]
    InvalidConfiguration(#[source] anyhow::Error),

    #[error("There was a network error while setting up this integration")]
    Network(#[source] anyhow::Error),

    #[error("There was a local I/O error while setting up this integration")]
    Io(#[source] anyhow::Error),
}

/// The relation between a value and the cache it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheStatus {
    /// The value was pulled fresh from the cache.
    Hit,
    /// The value was not available from the cache, and was regenerated.
    Miss,
    /// There was an error while reading from the cache, and it was treated as a miss.
    Error,
}

impl CacheStatus {
    /// The name of the status, as used in logs and metric tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
