//! Circuit breaker and resilient flight search
//!
//! `ResilientFlightSearch` wraps any `FlightSearch` with bounded retries, a
//! circuit breaker and a TTL cache. When the upstream is unavailable it
//! serves the last known result for the same search, marked approximate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use skyvoice_config::ToolConfig;

use crate::flight::{FlightSearch, SearchOutcome, SearchParams};
use crate::mcp::ToolError;

const MAX_CACHE_ENTRIES: usize = 256;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow; consecutive failures are counted
    Closed,
    /// Requests are rejected until the cooldown elapses
    Open,
    /// One trial call is allowed; its outcome closes or reopens the circuit
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Start of the half-open trial call, if one is out
    trial_started: Option<Instant>,
}

/// Consecutive-failure circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_started: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a request may go upstream at `now`
    pub fn allow(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map_or(true, |at| now.saturating_duration_since(at) >= self.cooldown);
                if cooled {
                    tracing::debug!("Circuit half-open, probing upstream");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started = Some(now);
                }
                cooled
            }
            CircuitState::HalfOpen => {
                // A trial call that never reported back expires after one cooldown
                let free = inner
                    .trial_started
                    .map_or(true, |at| now.saturating_duration_since(at) >= self.cooldown);
                if free {
                    if inner.trial_started.is_some() {
                        tracing::debug!("Half-open trial call expired, allowing another");
                    }
                    inner.trial_started = Some(now);
                }
                free
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!("Circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_started = None;
    }

    pub fn record_failure(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.trial_started = None;

        let trip = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if trip && inner.state != CircuitState::Open {
            tracing::warn!(
                failures = inner.consecutive_failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Circuit opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
        }
    }
}

/// Settles one upstream attempt with the breaker
///
/// Dropping an unsettled guard counts as a failure, so a caller that
/// abandons the search (e.g. on its own deadline) still reports back.
struct AttemptGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> AttemptGuard<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(ResilientFlightSearch::now());
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Flight search attempt abandoned");
            self.breaker.record_failure(ResilientFlightSearch::now());
        }
    }
}

struct CacheEntry {
    stored_at: Instant,
    outcome: SearchOutcome,
}

/// `FlightSearch` with retry, circuit breaker and cache
pub struct ResilientFlightSearch {
    inner: Arc<dyn FlightSearch>,
    breaker: CircuitBreaker,
    cache: Mutex<HashMap<String, CacheEntry>>,
    config: ToolConfig,
}

impl ResilientFlightSearch {
    pub fn new(inner: Arc<dyn FlightSearch>, config: ToolConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(config.failure_threshold, config.open_cooldown()),
            inner,
            cache: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    fn now() -> Instant {
        tokio::time::Instant::now().into_std()
    }

    /// Cached outcome for `key`; `fresh_only` ignores expired entries
    fn cached(&self, key: &str, fresh_only: bool) -> Option<SearchOutcome> {
        let cache = self.cache.lock();
        let entry = cache.get(key)?;
        let fresh = Self::now().saturating_duration_since(entry.stored_at) < self.config.cache_ttl();
        if fresh_only && !fresh {
            return None;
        }

        let mut outcome = entry.outcome.clone();
        outcome.cached = true;
        outcome.approximate = !fresh;
        Some(outcome)
    }

    fn store(&self, key: String, outcome: &SearchOutcome) {
        let mut cache = self.cache.lock();
        if cache.len() >= MAX_CACHE_ENTRIES && !cache.contains_key(&key) {
            let oldest = cache
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            key,
            CacheEntry {
                stored_at: Self::now(),
                outcome: outcome.clone(),
            },
        );
    }

    async fn attempt_upstream(&self, params: &SearchParams) -> Result<SearchOutcome, ToolError> {
        let mut last_error = ToolError::Unavailable("circuit open".to_string());

        for attempt in 0..=self.config.max_retries {
            if !self.breaker.allow(Self::now()) {
                return Err(last_error);
            }

            let guard = AttemptGuard::new(&self.breaker);
            let call = tokio::time::timeout(self.config.timeout(), self.inner.search(params));
            let result = match call.await {
                Ok(result) => result,
                Err(_) => Err(ToolError::timeout(
                    crate::flight::TOOL_NAME,
                    self.config.timeout().as_millis() as u64,
                )),
            };

            match result {
                Ok(outcome) => {
                    guard.success();
                    return Ok(outcome);
                }
                Err(e) => {
                    guard.failure();
                    tracing::warn!(attempt, error = %e, "Flight search attempt failed");
                    let retry = e.is_transient() && attempt < self.config.max_retries;
                    last_error = e;
                    if !retry {
                        break;
                    }
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl FlightSearch for ResilientFlightSearch {
    async fn search(&self, params: &SearchParams) -> Result<SearchOutcome, ToolError> {
        let key = params.cache_key();
        if let Some(hit) = self.cached(&key, true) {
            tracing::debug!(key = %key, "Flight search cache hit");
            return Ok(hit);
        }

        match self.attempt_upstream(params).await {
            Ok(outcome) => {
                self.store(key, &outcome);
                Ok(outcome)
            }
            Err(e) => match self.cached(&key, false) {
                Some(stale) => {
                    tracing::info!(key = %key, error = %e, "Serving stale flight results");
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }
}
