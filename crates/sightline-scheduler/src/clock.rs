use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::CancellationToken;

/// Source of monotonic time for retry and blackout bookkeeping.
///
/// Injected so that retry behavior can be tested without real delays.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;

    /// Blocks for `duration` or until `token` is cancelled.
    ///
    /// Returns `false` if the wait ended because of cancellation.
    fn sleep(&self, duration: Duration, token: &CancellationToken) -> bool;
}

/// Wall-clock implementation backed by [`Instant::now`] and thread sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

const SLEEP_SLICE: Duration = Duration::from_millis(5);

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, token: &CancellationToken) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if token.is_cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

/// Test clock whose time only moves when told to; `sleep` advances it instantly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            slept: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    /// Every duration passed to [`Clock::sleep`], in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }

    fn sleep(&self, duration: Duration, token: &CancellationToken) -> bool {
        if token.is_cancelled() {
            return false;
        }
        self.slept.lock().push(duration);
        self.advance(duration);
        true
    }
}
