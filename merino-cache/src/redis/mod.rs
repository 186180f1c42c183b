//! Interactions with Redis.

use crate::{CacheAdapter, CacheError};
use anyhow::Context;
use async_trait::async_trait;
use merino_suggest::SetupError;
use std::time::Duration;
use tracing_futures::Instrument;

/// A cache adapter backed by a shared Redis server.
///
/// Values are stored with `SET .. EX`, so Redis handles expiration.
#[derive(Clone)]
pub struct RedisAdapter {
    /// Connection to Redis. Cloning it shares the underlying multiplexed
    /// connection.
    redis_connection: redis::aio::ConnectionManager,
}

impl std::fmt::Debug for RedisAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAdapter").finish_non_exhaustive()
    }
}

impl RedisAdapter {
    /// Open a connection to the Redis server at `url`.
    ///
    /// # Errors
    /// Fails if the URL is invalid, or the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, SetupError> {
        tracing::debug!(%url, "Setting up redis connection");
        let client = redis::Client::open(url)
            .context("Setting up Redis client")
            .map_err(SetupError::InvalidConfiguration)?;

        let redis_connection = redis::aio::ConnectionManager::new(client)
            .await
            .context("Connecting to Redis")
            .map_err(SetupError::Network)?;

        Ok(Self { redis_connection })
    }
}

/// Redis refuses `EX 0`, so sub-second TTLs are rounded up.
fn expiry_seconds(ttl: Duration) -> usize {
    ttl.as_secs().max(1) as usize
}

#[async_trait]
impl CacheAdapter for RedisAdapter {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut connection = self.redis_connection.clone();
        let span = tracing::info_span!("getting-cache-entry", %key);
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<Vec<u8>>>(&mut connection)
            .instrument(span)
            .await
            .map_err(|error| CacheError::Adapter(error.into()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut connection = self.redis_connection.clone();
        let span = tracing::info_span!("storing-cache-entry", %key);
        let mut command = redis::cmd("SET");
        command.arg(key).arg(value);
        if let Some(ttl) = ttl {
            command.arg("EX").arg(expiry_seconds(ttl));
        }
        command
            .query_async::<_, ()>(&mut connection)
            .instrument(span)
            .await
            .map_err(|error| CacheError::Adapter(error.into()))
    }

    async fn close(&self) -> Result<(), CacheError> {
        // The connection manager closes its connection when the last clone drops.
        tracing::debug!("releasing redis connection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::expiry_seconds;
    use std::time::Duration;

    #[test]
    fn expiry_is_at_least_one_second() {
        assert_eq!(expiry_seconds(Duration::ZERO), 1);
        assert_eq!(expiry_seconds(Duration::from_millis(400)), 1);
        assert_eq!(expiry_seconds(Duration::from_secs(1800)), 1800);
    }
}
