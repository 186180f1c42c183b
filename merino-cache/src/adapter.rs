//! The contract every cache backend implements.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A key/value store holding byte payloads.
///
/// A missing key is `Ok(None)`. `Err` is reserved for the backend itself
/// failing, so callers can tell "not cached" apart from "cache unavailable".
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// An operator-visible name for this adapter.
    fn name(&self) -> &'static str;

    /// Fetch the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`. If `ttl` is given, the entry expires after it.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Release any resources held by the adapter.
    async fn close(&self) -> Result<(), CacheError>;
}

/// Errors that may occur while using the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached, or rejected the command.
    #[error("The cache backend failed: {0}")]
    Adapter(#[source] anyhow::Error),

    /// Stored data was not in the expected format.
    #[error("Cached data was not in the expected format: {0}")]
    Format(String),

    /// A value could not be converted to or from its stored form.
    #[error("There was an error serializing a cache payload: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// An adapter that never stores anything. Every read is a miss.
///
/// Used when caching is disabled, and in tests that want every fetch to reach
/// the upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCacheAdapter;

#[async_trait]
impl CacheAdapter for NoCacheAdapter {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
