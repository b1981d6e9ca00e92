//! Fixed-rate scheduling.

use std::time::{Duration, Instant};

/// Slowest accepted loop rate: one iteration every 100 s.
pub const MIN_RATE_HZ: f64 = 0.01;
/// Fastest accepted loop rate.
pub const MAX_RATE_HZ: f64 = 10_000.0;

/// Period of a loop running at `hz`, clamped to
/// `[MIN_RATE_HZ, MAX_RATE_HZ]`. Non-finite rates fall back to the slowest.
pub fn period_for_hz(hz: f64) -> Duration {
    let hz = if hz.is_finite() {
        hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ)
    } else {
        MIN_RATE_HZ
    };
    Duration::from_secs_f64(1.0 / hz)
}

/// Sleeps away whatever is left of the period since the last tick.
///
/// A late iteration is followed immediately by the next one; missed ticks
/// are not made up.
#[derive(Debug)]
pub struct RateLimiter {
    period: Duration,
    started: Instant,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            started: Instant::now(),
        }
    }

    pub fn from_hz(hz: f64) -> Self {
        Self::new(period_for_hz(hz))
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Mark the start of an iteration.
    pub fn start(&mut self) {
        self.started = Instant::now();
    }

    /// Time left in the current period, zero when late.
    pub fn remaining(&self) -> Duration {
        self.period.saturating_sub(self.started.elapsed())
    }

    /// Sleep out the period, then start the next one. Returns the time slept.
    pub fn wait(&mut self) -> Duration {
        let left = self.remaining();
        if !left.is_zero() {
            std::thread::sleep(left);
        }
        self.start();
        left
    }
}
