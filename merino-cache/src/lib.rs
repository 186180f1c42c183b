#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Manages Merino's cache.
//!
//! Integrations never talk to a cache backend directly. They describe the
//! upstream request with [`CacheKeyInputs`], and hand a loader to a
//! [`CacheAsideFetcher`], which checks the cache, calls the loader on a miss,
//! and writes the result back with a TTL reconciled against the upstream's
//! freshness hint.
//!
//! The backend is chosen at construction time by injecting one of the
//! [`CacheAdapter`] implementations.

mod adapter;
mod fetcher;
mod key;
mod memory;
mod payload;
mod redis;
mod ttl;

pub use crate::{
    adapter::{CacheAdapter, CacheError, NoCacheAdapter},
    fetcher::{CacheAsideFetcher, Fetched, Fresh},
    key::CacheKeyInputs,
    memory::MemoryAdapter,
    payload::CachePayload,
    redis::RedisAdapter,
    ttl::{effective_ttl, parse_expires, InvalidFreshnessHint, EXPIRES_FORMAT},
};

use merino_settings::{CacheBackend, Settings};
use merino_suggest::SetupError;
use std::sync::Arc;

/// Build the cache adapter selected by `settings.cache.backend`.
///
/// # Errors
/// Fails if Redis is selected but cannot be reached, or is not configured.
pub async fn make_adapter(settings: &Settings) -> Result<Arc<dyn CacheAdapter>, SetupError> {
    let adapter: Arc<dyn CacheAdapter> = match settings.cache.backend {
        CacheBackend::Redis => {
            let url = settings.redis.url.as_deref().ok_or_else(|| {
                SetupError::InvalidConfiguration(anyhow::anyhow!(
                    "No Redis URL is configured for caching"
                ))
            })?;
            Arc::new(RedisAdapter::connect(url).await?)
        }
        CacheBackend::Memory => Arc::new(MemoryAdapter::new()),
        CacheBackend::None => Arc::new(NoCacheAdapter),
    };
    tracing::info!(
        r#type = "cache.adapter.ready",
        adapter = adapter.name(),
        "Cache adapter configured"
    );
    Ok(adapter)
}
