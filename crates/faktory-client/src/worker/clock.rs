//! Time source for heartbeat scheduling and idle pauses.

use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock and sleeper driving the worker loop.
pub trait Clock: Send {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by [`Instant`] and [`thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
