//! Request pacing: an injectable clock and the shared request budget.
//!
//! The provider allows 30 requests per 60 seconds. All waiting in the
//! pipeline (rate-limit pacing, 429 cooldowns, retry backoff) goes through
//! [`Clock::sleep`], so tests can run hours of simulated time instantly.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Source of "today" and of blocking waits.
pub trait Clock {
    /// Current calendar date on the provider's (UTC) publishing calendar.
    fn today(&self) -> NaiveDate;

    /// Block the calling thread for `dur`.
    fn sleep(&self, dur: Duration);
}

/// Wall clock with real blocking sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

#[derive(Debug)]
struct ManualState {
    today: NaiveDate,
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Simulated clock: sleeping advances elapsed time instead of blocking.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            state: Mutex::new(ManualState {
                today,
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Total simulated time slept so far.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Every sleep requested, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        let state = self.lock();
        let days = (state.elapsed.as_secs() / 86_400) as i64;
        state.today + ChronoDuration::days(days)
    }

    fn sleep(&self, dur: Duration) {
        let mut state = self.lock();
        state.elapsed += dur;
        state.sleeps.push(dur);
    }
}

/// Rolling request counter shared by every bar request in a run.
///
/// Once `limit` requests have been issued, the next acquisition sleeps a full
/// `window` and starts a new count.
#[derive(Debug, Clone)]
pub struct RequestBudget {
    limit: u32,
    window: Duration,
    issued: u32,
}

impl RequestBudget {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            issued: 0,
        }
    }

    /// Charge one request, pausing first if the window is spent.
    pub fn acquire(&mut self, clock: &dyn Clock) {
        if self.issued >= self.limit {
            info!(
                limit = self.limit,
                window_secs = self.window.as_secs(),
                "request budget spent, sleeping"
            );
            clock.sleep(self.window);
            self.issued = 0;
        }
        self.issued += 1;
    }

    /// Start a new window. Only valid after the caller has itself waited at
    /// least `window`.
    pub fn reset(&mut self) {
        self.issued = 0;
    }

    pub fn issued(&self) -> u32 {
        self.issued
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for RequestBudget {
    fn default() -> Self {
        Self::new(30, Duration::from_secs(60))
    }
}
