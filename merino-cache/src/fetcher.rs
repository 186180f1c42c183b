//! Cache-aside fetching of upstream resources.

use crate::{
    effective_ttl, parse_expires, CacheAdapter, CacheKeyInputs, CachePayload,
    InvalidFreshnessHint,
};
use cadence::{Counted, StatsdClient};
use chrono::Utc;
use merino_suggest::{
    metrics::{Stopwatch, TimedMicros},
    CacheStatus,
};
use std::{collections::HashSet, future::Future, sync::Arc, time::Duration};
use tracing_futures::Instrument;

/// A freshly loaded upstream value, with the upstream's freshness hint.
#[derive(Debug, Clone, PartialEq)]
pub struct Fresh<T> {
    /// The loaded value.
    pub value: T,

    /// The raw `Expires` header, if the upstream sent one.
    pub expires: Option<String>,
}

impl<T> Fresh<T> {
    /// A value with no freshness hint.
    pub fn new(value: T) -> Self {
        Self {
            value,
            expires: None,
        }
    }

    /// Attach a freshness hint.
    #[must_use]
    pub fn with_expires<S: Into<String>>(mut self, expires: Option<S>) -> Self {
        self.expires = expires.map(Into::into);
        self
    }
}

/// The result of a cache-aside fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    /// The value, from the cache or the upstream.
    pub value: T,

    /// Where the value came from.
    pub cache_status: CacheStatus,

    /// How long the value may be considered fresh. On a miss this is the TTL
    /// it was stored with. On a hit the remaining lifetime is unknown, and
    /// the floor is reported.
    pub ttl: Duration,
}

/// The result of checking the cache for an entry.
#[derive(Debug)]
enum CacheCheckResult<T> {
    /// The entry was found in the cache.
    Hit(T),
    /// The entry was not found in the cache.
    Miss,
    /// There was an error retrieving the item from the cache that should be
    /// treated as a miss.
    ErrorAsMiss,
}

/// Wraps upstream loads with a read-through cache.
#[derive(Clone)]
pub struct CacheAsideFetcher {
    /// Where entries are stored.
    adapter: Arc<dyn CacheAdapter>,

    /// Prepended to every key.
    key_prefix: String,

    /// Query parameters that never contribute to keys.
    excluded_params: HashSet<String>,

    /// The metrics client to record cache outcomes with.
    metrics_client: StatsdClient,
}

impl std::fmt::Debug for CacheAsideFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAsideFetcher")
            .field("adapter", &self.adapter.name())
            .field("key_prefix", &self.key_prefix)
            .field("excluded_params", &self.excluded_params)
            .finish_non_exhaustive()
    }
}

impl CacheAsideFetcher {
    /// Create a fetcher storing entries in `adapter`.
    pub fn new<P, I, S>(
        adapter: Arc<dyn CacheAdapter>,
        key_prefix: P,
        excluded_params: I,
        metrics_client: StatsdClient,
    ) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            adapter,
            key_prefix: key_prefix.into(),
            excluded_params: excluded_params.into_iter().map(Into::into).collect(),
            metrics_client,
        }
    }

    /// The key `inputs` will be stored under.
    pub fn cache_key(&self, inputs: &CacheKeyInputs) -> String {
        inputs.cache_key(&self.key_prefix, &self.excluded_params)
    }

    /// Return the cached value for `inputs`, or call `loader` and cache what
    /// it returns.
    ///
    /// Cache failures never fail the fetch: unreadable entries are treated as
    /// misses, and failed writes are only logged. The stored TTL is the larger
    /// of `ttl_floor` and the time remaining until the loader's `Expires`
    /// hint.
    ///
    /// # Errors
    /// Returns the loader's error unchanged, or an [`InvalidFreshnessHint`]
    /// converted into `E` if the loader's hint cannot be parsed. Nothing is
    /// cached in either case.
    pub async fn fetch<T, E, L, Fut>(
        &self,
        inputs: &CacheKeyInputs,
        ttl_floor: Duration,
        loader: L,
    ) -> Result<Fetched<T>, E>
    where
        T: CachePayload + Send,
        E: From<InvalidFreshnessHint>,
        L: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Fresh<T>, E>> + Send,
    {
        let key = self.cache_key(inputs);
        let operation = inputs.operation();
        let stopwatch = Stopwatch::start();
        let span = tracing::debug_span!("cache-fetch", %key, %operation);

        async move {
            let cache_status = match self.check::<T>(&key, operation).await {
                CacheCheckResult::Hit(value) => {
                    tracing::debug!(r#type = "cache.fetch.hit", "cache hit");
                    self.count("cache.fetch.hit", operation);
                    self.record_timing(stopwatch, operation, CacheStatus::Hit);
                    return Ok(Fetched {
                        value,
                        cache_status: CacheStatus::Hit,
                        ttl: ttl_floor,
                    });
                }
                CacheCheckResult::Miss => {
                    tracing::debug!(r#type = "cache.fetch.miss", "cache miss");
                    self.count("cache.fetch.miss", operation);
                    CacheStatus::Miss
                }
                CacheCheckResult::ErrorAsMiss => {
                    self.count("cache.fetch.error", operation);
                    CacheStatus::Error
                }
            };

            let upstream_timer = Stopwatch::start();
            let loaded = loader().await;
            self.metrics_client
                .time_micros_with_tags("upstream.request-us", upstream_timer.elapsed())
                .with_tag("operation", operation)
                .send();

            // Failed fetches are timed as well, then the error is passed on.
            let fetched = match loaded {
                Ok(Fresh { value, expires }) => self
                    .reconcile_ttl(ttl_floor, expires.as_deref(), operation)
                    .map(|ttl| (value, ttl))
                    .map_err(E::from),
                Err(error) => Err(error),
            };
            let fetched = match fetched {
                Ok((value, ttl)) => {
                    self.store(&key, &value, ttl, operation).await;
                    Ok(Fetched {
                        value,
                        cache_status,
                        ttl,
                    })
                }
                Err(error) => Err(error),
            };
            self.record_timing(stopwatch, operation, cache_status);
            fetched
        }
        .instrument(span)
        .await
    }

    /// Retrieve an entry from the cache.
    async fn check<T: CachePayload>(&self, key: &str, operation: &str) -> CacheCheckResult<T> {
        match self.adapter.get(key).await {
            Ok(Some(bytes)) => match T::from_cache_bytes(&bytes) {
                Ok(value) => CacheCheckResult::Hit(value),
                Err(error) => {
                    tracing::warn!(
                        r#type = "cache.fetch.error",
                        %error,
                        %key,
                        %operation,
                        "Cached value not of expected type, treating as cache miss"
                    );
                    CacheCheckResult::ErrorAsMiss
                }
            },
            Ok(None) => CacheCheckResult::Miss,
            Err(error) => {
                tracing::error!(
                    r#type = "cache.fetch.error",
                    %error,
                    %key,
                    %operation,
                    "Error reading from cache, treating as cache miss"
                );
                CacheCheckResult::ErrorAsMiss
            }
        }
    }

    /// Work out the TTL to store a fresh value with.
    fn reconcile_ttl(
        &self,
        ttl_floor: Duration,
        expires: Option<&str>,
        operation: &str,
    ) -> Result<Duration, InvalidFreshnessHint> {
        match expires {
            None => {
                tracing::debug!(
                    r#type = "cache.ttl.missing_hint",
                    %operation,
                    ?ttl_floor,
                    "Upstream sent no freshness hint, using the TTL floor"
                );
                self.count("cache.ttl.missing_hint", operation);
                Ok(ttl_floor)
            }
            Some(hint) => match parse_expires(hint) {
                Ok(expires_at) => Ok(effective_ttl(ttl_floor, expires_at, Utc::now())),
                Err(error) => {
                    tracing::error!(
                        r#type = "cache.ttl.invalid_hint",
                        %error,
                        %operation,
                        "Upstream sent an unparseable freshness hint"
                    );
                    self.count("cache.ttl.invalid_hint", operation);
                    Err(error)
                }
            },
        }
    }

    /// Write a fresh value to the cache. Failures are logged and counted.
    async fn store<T: CachePayload>(&self, key: &str, value: &T, ttl: Duration, operation: &str) {
        let bytes = match value.to_cache_bytes() {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::error!(r#type = "cache.store.error", %error, %key, "Could not serialize value for the cache");
                self.count("cache.store.error", operation);
                return;
            }
        };

        tracing::debug!(%key, ?ttl, "storing cache entry");
        if let Err(error) = self.adapter.set(key, &bytes, Some(ttl)).await {
            tracing::error!(r#type = "cache.store.error", %error, %key, "Error while storing cache entry");
            self.count("cache.store.error", operation);
        }
    }

    /// Increment a counter tagged with the operation.
    fn count(&self, name: &str, operation: &str) {
        self.metrics_client
            .count_with_tags(name, 1_i64)
            .with_tag("operation", operation)
            .send();
    }

    /// Record how long a whole fetch took.
    fn record_timing(&self, stopwatch: Stopwatch, operation: &str, status: CacheStatus) {
        self.metrics_client
            .time_micros_with_tags("cache.fetch-us", stopwatch.elapsed())
            .with_tag("operation", operation)
            .with_tag("cache-status", status.as_str())
            .send();
    }
}
