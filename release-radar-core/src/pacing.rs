//! Self-imposed request pacing.
//!
//! Two kinds of delay keep the pipeline under the remote service's rate ceiling:
//! - a flat pause between consecutive requests of a loop (pages, removal batches, additions);
//! - a budgeted wait after a burst of requests for one unit of work (one artist), sleeping
//!   only the part of `count / requests * per` that has not already elapsed.
//!
//! Time is read and spent through the [`Clock`] trait so tests can drive it without real delays.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Source of wall-clock time, monotonic time and sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current UTC wall-clock time. Drives "today" and eviction thresholds.
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic time since an arbitrary origin. Drives elapsed-time measurement.
    fn monotonic(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by `tokio::time::sleep`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Target throughput: at most `requests` requests every `per`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBudget {
    pub requests: u32,
    pub per: Duration,
}

impl RequestBudget {
    pub const fn new(requests: u32, per: Duration) -> Self {
        Self { requests, per }
    }

    /// Minimum interval that `count` requests must span to stay within budget.
    pub fn window(&self, count: u32) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }
        self.per.mul_f64(f64::from(count) / f64::from(self.requests))
    }

    /// Remaining idle time after `count` requests took `elapsed`. Never negative.
    pub fn shortfall(&self, count: u32, elapsed: Duration) -> Duration {
        self.window(count).saturating_sub(elapsed)
    }
}

impl Default for RequestBudget {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// All delays used by one synchronisation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Flat delay between playlist or follow-list pages.
    pub page_delay: Duration,
    /// Flat delay between removal batches.
    pub batch_delay: Duration,
    /// Flat delay before each playlist addition; keeps insertion order stable.
    pub add_delay: Duration,
    /// Budget for the requests issued while scanning one artist.
    pub artist_budget: RequestBudget,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(350),
            batch_delay: Duration::from_millis(350),
            add_delay: Duration::from_secs(1),
            artist_budget: RequestBudget::default(),
        }
    }
}

/// Start of a measured window, in the clock's monotonic time.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Duration,
}

/// Blocks the caller just long enough to respect a pacing rule.
#[derive(Clone, Copy)]
pub struct RateLimiter<'a> {
    clock: &'a dyn Clock,
}

impl<'a> RateLimiter<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn start(&self) -> Stopwatch {
        Stopwatch {
            started: self.clock.monotonic(),
        }
    }

    pub fn elapsed(&self, watch: &Stopwatch) -> Duration {
        self.clock.monotonic().saturating_sub(watch.started)
    }

    /// Sleep whatever part of the budget for `count` requests has not elapsed since `watch`.
    /// Returns the time slept.
    pub async fn pace(&self, watch: &Stopwatch, budget: RequestBudget, count: u32) -> Duration {
        let elapsed = self.elapsed(watch);
        let wait = budget.shortfall(count, elapsed);
        if wait.is_zero() {
            debug!(
                requests = count,
                elapsed_ms = elapsed.as_millis() as u64,
                "[PACE] Request budget already satisfied"
            );
            return Duration::ZERO;
        }
        debug!(
            requests = count,
            wait_ms = wait.as_millis() as u64,
            "[PACE] Waiting to not hit rate limit"
        );
        self.clock.sleep(wait).await;
        wait
    }

    /// Flat delay between two requests of a loop.
    pub async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        debug!(wait_ms = delay.as_millis() as u64, "[PACE] Waiting to not hit rate limit");
        self.clock.sleep(delay).await;
    }
}

/// Simulated clock for tests. Sleeping advances virtual time and is recorded.
#[cfg(any(test, feature = "test-export-mocks"))]
pub struct ManualClock {
    state: std::sync::Mutex<ManualState>,
}

#[cfg(any(test, feature = "test-export-mocks"))]
struct ManualState {
    now: DateTime<Utc>,
    monotonic: Duration,
    sleeps: Vec<Duration>,
}

#[cfg(any(test, feature = "test-export-mocks"))]
impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: std::sync::Mutex::new(ManualState {
                now,
                monotonic: Duration::ZERO,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Let time pass without sleeping, e.g. to simulate request latency.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.monotonic += duration;
        state.now += chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(any(test, feature = "test-export-mocks"))]
#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }

    fn monotonic(&self) -> Duration {
        self.lock().monotonic
    }

    async fn sleep(&self, duration: Duration) {
        self.lock().sleeps.push(duration);
        self.advance(duration);
    }
}
