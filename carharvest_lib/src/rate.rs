//! Politeness pacing and retry scheduling for catalog requests.
//!
//! One `RateController` gates every request of a run. It keeps a single
//! last-request clock, spaces requests by a random delay drawn from the
//! configured window, applies a coarser delay when the crawl moves to a new
//! brand, and retries transient failures with capped exponential backoff.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::time::{sleep, Instant};

use crate::error::FetchError;

/// Retry budget for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(30);
        let exp = 1u32 << shift;
        self.base_delay
            .checked_mul(exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Pacing and retry settings for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Extra random delay in `[0, jitter]` added on top of the window.
    pub jitter: Duration,
    /// Minimum spacing before the first request of a new brand.
    pub brand_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
            jitter: Duration::from_millis(500),
            brand_delay: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl RatePolicy {
    /// Defaults overridden by `CARHARVEST_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_delay: env_ms("CARHARVEST_MIN_DELAY_MS", d.min_delay),
            max_delay: env_ms("CARHARVEST_MAX_DELAY_MS", d.max_delay),
            jitter: env_ms("CARHARVEST_JITTER_MS", d.jitter),
            brand_delay: env_ms("CARHARVEST_BRAND_DELAY_MS", d.brand_delay),
            retry: RetryPolicy {
                max_attempts: env_u32("CARHARVEST_RETRY_MAX", d.retry.max_attempts),
                base_delay: env_ms("CARHARVEST_RETRY_BASE_MS", d.retry.base_delay),
                max_delay: env_ms("CARHARVEST_RETRY_MAX_MS", d.retry.max_delay),
            },
        }
    }

    /// No waiting at all. Used with synthetic catalogs.
    pub fn immediate() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            brand_delay: Duration::ZERO,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            },
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_delay > self.max_delay {
            return Err(format!(
                "min delay {}ms exceeds max delay {}ms",
                self.min_delay.as_millis(),
                self.max_delay.as_millis()
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err("max attempts must be at least 1".into());
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err("retry base delay exceeds retry cap".into());
        }
        Ok(())
    }
}

/// Bounded retry state: how many attempts have failed so far.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Failed attempts recorded so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Records a failed attempt. Returns the wait before the next attempt, or
    /// `None` once `max_attempts` attempts have failed.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.policy.max_attempts {
            None
        } else {
            Some(self.policy.delay_for_attempt(self.attempt))
        }
    }
}

#[derive(Debug, Default)]
struct Clock {
    last_request: Option<Instant>,
    brand_transition: bool,
}

/// Shared request gate. See the module docs.
pub struct RateController {
    policy: RatePolicy,
    clock: Mutex<Clock>,
    tracker: RequestTracker,
}

impl RateController {
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            policy,
            clock: Mutex::new(Clock::default()),
            tracker: RequestTracker::new(),
        }
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Marks a brand boundary: the next request waits at least `brand_delay`
    /// after the previous one.
    pub fn enter_brand(&self) {
        self.clock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .brand_transition = true;
    }

    /// Waits until the next request may be sent, then stamps the clock.
    /// The first request of a run is not delayed.
    pub async fn pace(&self) {
        let wait = {
            let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
            let transition = std::mem::take(&mut clock.brand_transition);
            clock.last_request.map(|last| {
                let mut target = self.politeness_delay();
                if transition {
                    target = target.max(self.policy.brand_delay);
                }
                target.saturating_sub(last.elapsed())
            })
        };
        if let Some(dur) = wait.filter(|d| !d.is_zero()) {
            tracing::debug!("Pacing next request by {:.2}s", dur.as_secs_f64());
            sleep(dur).await;
        }
        self.clock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_request = Some(Instant::now());
    }

    /// Runs `operation` behind the pacing gate, retrying transient failures.
    ///
    /// Non-transient errors return immediately. When the retry budget is spent
    /// the last transient failure is returned as `FetchError::Permanent`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut backoff = Backoff::new(self.policy.retry);
        loop {
            self.pace().await;
            match operation().await {
                Ok(value) => {
                    self.tracker.record_success();
                    return Ok(value);
                }
                Err(FetchError::Transient { url, reason }) => {
                    self.tracker.record_transient();
                    match backoff.next_delay() {
                        Some(delay) => {
                            tracing::warn!(
                                "{} request failed (attempt {}/{}), retrying in {:.1}s: {}",
                                label,
                                backoff.attempt(),
                                self.policy.retry.max_attempts,
                                delay.as_secs_f64(),
                                reason
                            );
                            self.tracker.record_backoff(delay);
                            sleep(delay).await;
                        }
                        None => {
                            self.tracker.record_exhausted();
                            return Err(FetchError::Permanent {
                                url,
                                reason,
                                attempts: backoff.attempt(),
                            });
                        }
                    }
                }
                Err(err) => {
                    self.tracker.record_failure();
                    return Err(err);
                }
            }
        }
    }

    fn politeness_delay(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let lo = self.policy.min_delay.as_millis() as u64;
        let hi = (self.policy.max_delay.as_millis() as u64).max(lo);
        let jitter = self.policy.jitter.as_millis() as u64;
        Duration::from_millis(rng.gen_range(lo..=hi) + rng.gen_range(0..=jitter))
    }
}

/// Atomic counters tracking request outcomes.
pub struct RequestTracker {
    requests_made: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_transient: AtomicU64,
    requests_failed: AtomicU64,
    retries_exhausted: AtomicU64,
    /// Cumulative backoff time in milliseconds.
    total_backoff_ms: AtomicU64,
}

impl RequestTracker {
    fn new() -> Self {
        Self {
            requests_made: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            requests_transient: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            retries_exhausted: AtomicU64::new(0),
            total_backoff_ms: AtomicU64::new(0),
        }
    }

    pub fn record_success(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transient(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_transient.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A request whose transient failures used up the retry budget.
    pub fn record_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backoff(&self, duration: Duration) {
        self.total_backoff_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            requests_made: self.requests_made.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_transient: self.requests_transient.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            total_backoff_secs: self.total_backoff_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Immutable snapshot of tracker counters for display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerSummary {
    pub requests_made: u64,
    pub requests_succeeded: u64,
    pub requests_transient: u64,
    pub requests_failed: u64,
    pub retries_exhausted: u64,
    pub total_backoff_secs: f64,
}

fn env_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<u32>().ok())
        .unwrap_or(default)
}
