#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Shields Merino from failing upstream services.
//!
//! Each integration point owns one [`CircuitBreaker`]. While the upstream is
//! healthy every call goes through. After enough consecutive failures the
//! breaker opens, and calls return a fallback value without touching the
//! upstream until the recovery timeout has passed. Then a single trial call
//! decides whether the breaker closes again or stays open.

use cadence::{Counted, Gauged, StatsdClient};
use merino_settings::CircuitBreakerSettings;
use parking_lot::Mutex;
use std::{future::Future, time::Duration};
use tokio::time::Instant;

/// Where a breaker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls go through normally.
    Closed,
    /// Calls are short-circuited to the fallback.
    Open {
        /// When the breaker last opened.
        opened_at: Instant,
    },
    /// The recovery timeout has passed and a trial call is in flight.
    HalfOpen,
}

impl CircuitState {
    /// The value reported on the `circuit_breaker.state` gauge.
    fn gauge_value(&self) -> u64 {
        match self {
            Self::Closed => 0,
            Self::Open { .. } => 1,
            Self::HalfOpen => 2,
        }
    }

    /// A short name for logs.
    fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open { .. } => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// The mutable part of a breaker. Always read and written under one lock
/// acquisition.
#[derive(Debug)]
struct BreakerState {
    /// The current state.
    state: CircuitState,
    /// Consecutive expected failures. Kept while open, reset by a success.
    failure_count: u32,
}

/// What a caller is allowed to do, decided when the call arrives.
enum Admission {
    /// Call the upstream as usual.
    Call,
    /// Call the upstream as the half-open trial. Holds the time the breaker
    /// opened, to restore if the trial is abandoned.
    Trial(Instant),
    /// Return the fallback without calling the upstream.
    Fallback,
}

/// A circuit breaker for one integration point.
///
/// `T` is the type of value the wrapped calls produce, and `E` their error.
/// Only errors for which the `is_expected` predicate returns `true` count as
/// failures. Others are passed through without affecting the breaker.
pub struct CircuitBreaker<T, E> {
    /// The integration point's name. Used to tag metrics.
    name: String,

    /// Consecutive failures needed to open the breaker.
    failure_threshold: u32,

    /// How long the breaker stays open before allowing a trial.
    recovery_timeout: Duration,

    /// Returned instead of calling the upstream while open.
    fallback: T,

    /// Decides which errors count as failures.
    is_expected: fn(&E) -> bool,

    /// State shared between concurrent callers.
    inner: Mutex<BreakerState>,

    /// The metrics client to report transitions with.
    metrics_client: StatsdClient,
}

impl<T, E> std::fmt::Debug for CircuitBreaker<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl<T: Clone, E> CircuitBreaker<T, E> {
    /// Create a closed breaker.
    pub fn new<N: Into<String>>(
        name: N,
        settings: &CircuitBreakerSettings,
        fallback: T,
        is_expected: fn(&E) -> bool,
        metrics_client: StatsdClient,
    ) -> Self {
        let name = name.into();
        tracing::info!(
            r#type = "circuit_breaker.init",
            %name,
            failure_threshold = settings.failure_threshold,
            recovery_timeout = ?settings.recovery_timeout(),
            "Circuit breaker initialized"
        );
        Self {
            name,
            failure_threshold: settings.failure_threshold,
            recovery_timeout: settings.recovery_timeout(),
            fallback,
            is_expected,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
            }),
            metrics_client,
        }
    }

    /// The integration point this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// The current count of consecutive failures.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Run `operation` under the breaker.
    ///
    /// While the breaker is open, `operation` is not called and the fallback is
    /// returned as `Ok`.
    ///
    /// # Errors
    /// Returns the error produced by `operation`, whether or not it counted
    /// as a failure.
    pub async fn call<F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.admit() {
            Admission::Fallback => {
                tracing::debug!(
                    r#type = "circuit_breaker.fallback",
                    name = %self.name,
                    "Circuit open, returning fallback"
                );
                self.metrics_client
                    .count_with_tags("circuit_breaker.fallback", 1_i64)
                    .with_tag("name", &self.name)
                    .send();
                Ok(self.fallback.clone())
            }
            Admission::Call => {
                let result = operation().await;
                self.record(&result, false);
                result
            }
            Admission::Trial(opened_at) => {
                let mut guard = TrialGuard {
                    breaker: self,
                    opened_at,
                    settled: false,
                };
                let result = operation().await;
                if result.as_ref().err().map_or(true, self.is_expected) {
                    guard.settled = true;
                    self.record(&result, true);
                }
                result
            }
        }
    }

    /// Decide how to handle an incoming call, moving from open to half open
    /// if the recovery timeout has passed.
    fn admit(&self) -> Admission {
        let (admission, transition) = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => (Admission::Call, None),
                CircuitState::HalfOpen => (Admission::Fallback, None),
                CircuitState::Open { opened_at } => {
                    if opened_at.elapsed() >= self.recovery_timeout {
                        inner.state = CircuitState::HalfOpen;
                        (
                            Admission::Trial(opened_at),
                            Some((CircuitState::HalfOpen, inner.failure_count)),
                        )
                    } else {
                        (Admission::Fallback, None)
                    }
                }
            }
        };
        if let Some((state, failure_count)) = transition {
            self.report(state, failure_count);
        }
        admission
    }

    /// Update the state after a call finished.
    fn record(&self, result: &Result<T, E>, trial: bool) {
        let transition = {
            let mut inner = self.inner.lock();
            match result {
                Ok(_) => {
                    let was = inner.state;
                    match was {
                        CircuitState::Closed => {
                            inner.failure_count = 0;
                            None
                        }
                        CircuitState::HalfOpen if trial => {
                            inner.failure_count = 0;
                            inner.state = CircuitState::Closed;
                            Some((inner.state, 0))
                        }
                        // Opened by concurrent failures while this call was in flight.
                        _ => None,
                    }
                }
                Err(error) if (self.is_expected)(error) => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    let should_open = match inner.state {
                        CircuitState::Closed => inner.failure_count >= self.failure_threshold,
                        CircuitState::HalfOpen => trial,
                        CircuitState::Open { .. } => false,
                    };
                    if should_open {
                        inner.state = CircuitState::Open {
                            opened_at: Instant::now(),
                        };
                    }
                    Some((inner.state, inner.failure_count))
                }
                Err(_) => None,
            }
        };
        if let Some((state, failure_count)) = transition {
            self.report(state, failure_count);
        }
    }

    /// Give up on a trial that will never report a result, returning to the
    /// open state it started from.
    fn abandon_trial(&self, opened_at: Instant) {
        let transition = {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Open { opened_at };
                Some((inner.state, inner.failure_count))
            } else {
                None
            }
        };
        if let Some((state, failure_count)) = transition {
            tracing::warn!(
                r#type = "circuit_breaker.trial_abandoned",
                name = %self.name,
                "Half-open trial did not complete, reopening"
            );
            self.report(state, failure_count);
        }
    }

    /// Log and record the breaker's state.
    fn report(&self, state: CircuitState, failure_count: u32) {
        match state {
            CircuitState::Open { .. } => tracing::warn!(
                r#type = "circuit_breaker.state",
                name = %self.name,
                state = state.as_str(),
                failure_count,
                "Circuit breaker open"
            ),
            _ => tracing::info!(
                r#type = "circuit_breaker.state",
                name = %self.name,
                state = state.as_str(),
                failure_count,
                "Circuit breaker state changed"
            ),
        }
        self.metrics_client
            .gauge_with_tags("circuit_breaker.state", state.gauge_value())
            .with_tag("name", &self.name)
            .send();
        self.metrics_client
            .gauge_with_tags("circuit_breaker.failure_count", u64::from(failure_count))
            .with_tag("name", &self.name)
            .send();
    }
}

/// Restores the open state if a half-open trial is dropped before it
/// settles, so the breaker never stays half open forever.
struct TrialGuard<'a, T: Clone, E> {
    /// The breaker running the trial.
    breaker: &'a CircuitBreaker<T, E>,
    /// When the breaker opened before the trial began.
    opened_at: Instant,
    /// Whether the trial's outcome has been recorded.
    settled: bool,
}

impl<'a, T: Clone, E> Drop for TrialGuard<'a, T, E> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon_trial(self.opened_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CircuitBreaker, CircuitState};
    use cadence::{NopMetricSink, SpyMetricSink, StatsdClient};
    use futures::FutureExt;
    use merino_settings::CircuitBreakerSettings;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    enum TestError {
        #[error("upstream is down")]
        Upstream,
        #[error("caller made a mistake")]
        BadInput,
    }

    fn is_expected(error: &TestError) -> bool {
        matches!(error, TestError::Upstream)
    }

    fn settings() -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            failure_threshold: 3,
            recovery_timeout_sec: 30.0,
        }
    }

    fn breaker() -> CircuitBreaker<Option<u32>, TestError> {
        CircuitBreaker::new(
            "weather",
            &settings(),
            None,
            is_expected,
            StatsdClient::from_sink("merino-test", NopMetricSink),
        )
    }

    async fn fail(breaker: &CircuitBreaker<Option<u32>, TestError>, calls: &AtomicUsize) {
        let _ = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Upstream)
            })
            .await;
    }

    async fn succeed(
        breaker: &CircuitBreaker<Option<u32>, TestError>,
        calls: &AtomicUsize,
    ) -> Result<Option<u32>, TestError> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(42))
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_returns_fallback() {
        let breaker = breaker();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            fail(&breaker, &calls).await;
        }
        assert!(matches!(breaker.state(), CircuitState::Open { .. }));
        assert_eq!(breaker.failure_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        for _ in 0..5 {
            assert_eq!(succeed(&breaker, &calls).await, Ok(None));
            tokio::time::advance(Duration::from_secs(5)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.failure_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_propagate_while_closed() {
        let breaker = breaker();
        let result = breaker.call(|| async { Err(TestError::Upstream) }).await;
        assert_eq!(result, Err(TestError::Upstream));
        assert_eq!(breaker.failure_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_count() {
        let breaker = breaker();
        let calls = AtomicUsize::new(0);
        fail(&breaker, &calls).await;
        fail(&breaker, &calls).await;
        assert_eq!(breaker.failure_count(), 2);
        assert_eq!(succeed(&breaker, &calls).await, Ok(Some(42)));
        assert_eq!(breaker.failure_count(), 0);
        fail(&breaker, &calls).await;
        fail(&breaker, &calls).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_errors_are_not_counted() {
        let breaker = breaker();
        for _ in 0..10 {
            let result = breaker.call(|| async { Err(TestError::BadInput) }).await;
            assert_eq!(result, Err(TestError::BadInput));
        }
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn one_trial_after_recovery_then_closes() {
        let breaker = breaker();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            fail(&breaker, &calls).await;
        }

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(succeed(&breaker, &calls).await, Ok(Some(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_with_a_fresh_timestamp() {
        let breaker = breaker();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            fail(&breaker, &calls).await;
        }
        let first_opened = match breaker.state() {
            CircuitState::Open { opened_at } => opened_at,
            other => panic!("expected open, got {:?}", other),
        };

        tokio::time::advance(Duration::from_secs(31)).await;
        fail(&breaker, &calls).await;
        match breaker.state() {
            CircuitState::Open { opened_at } => assert!(opened_at > first_opened),
            other => panic!("expected open, got {:?}", other),
        }
        assert_eq!(breaker.failure_count(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        assert_eq!(succeed(&breaker, &calls).await, Ok(None));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_get_fallback_during_trial() {
        let breaker = breaker();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            fail(&breaker, &calls).await;
        }
        tokio::time::advance(Duration::from_secs(31)).await;

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let trial = breaker.call(move || async move {
            rx.await.ok();
            Ok(Some(1))
        });
        let bystander = async {
            let result = breaker.call(|| async { Ok(Some(2)) }).await;
            tx.send(()).ok();
            result
        };

        let (trial_result, bystander_result) = tokio::join!(trial, bystander);
        assert_eq!(trial_result, Ok(Some(1)));
        assert_eq!(bystander_result, Ok(None));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_trial_does_not_leave_breaker_half_open() {
        let breaker = breaker();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            fail(&breaker, &calls).await;
        }
        let opened = breaker.state();
        tokio::time::advance(Duration::from_secs(31)).await;

        let cancelled = breaker
            .call(|| futures::future::pending::<Result<Option<u32>, TestError>>())
            .now_or_never();
        assert!(cancelled.is_none());
        assert_eq!(breaker.state(), opened);

        assert_eq!(succeed(&breaker, &calls).await, Ok(Some(42)));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_trial_error_reopens_without_counting() {
        let breaker = breaker();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            fail(&breaker, &calls).await;
        }
        let opened = breaker.state();
        tokio::time::advance(Duration::from_secs(31)).await;

        let result = breaker.call(|| async { Err(TestError::BadInput) }).await;
        assert_eq!(result, Err(TestError::BadInput));
        assert_eq!(breaker.state(), opened);
        assert_eq!(breaker.failure_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_are_reported_as_gauges() {
        let (rx, sink) = SpyMetricSink::new();
        let breaker: CircuitBreaker<Option<u32>, TestError> = CircuitBreaker::new(
            "weather",
            &settings(),
            None,
            is_expected,
            StatsdClient::from_sink("merino-test", sink),
        );
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            fail(&breaker, &calls).await;
        }
        succeed(&breaker, &calls).await.ok();

        let sent: Vec<String> = rx
            .try_iter()
            .map(|bytes| String::from_utf8(bytes).unwrap())
            .collect();
        assert!(sent.contains(&"merino-test.circuit_breaker.state:1|g|#name:weather".to_string()));
        assert!(sent.contains(
            &"merino-test.circuit_breaker.failure_count:3|g|#name:weather".to_string()
        ));
        assert!(sent.contains(&"merino-test.circuit_breaker.fallback:1|c|#name:weather".to_string()));
    }
}
