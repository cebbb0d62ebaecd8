// THEORY:
// Every timestamp the guard reasons about is a `Duration` since the session
// started. Dwell and cooldown only ever subtract two of them, so the only
// requirement is that they never go backwards.

use std::time::{Duration, Instant};

/// Monotonic session clock.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Turns recorded timestamps (replays, external clocks) into a non-decreasing
/// sequence by holding the previous value whenever time appears to step back.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicGuard {
    last: Duration,
}

impl MonotonicGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `t`, or the previous value if `t` is older. The flag is true
    /// when the input had to be held.
    pub fn observe(&mut self, t: Duration) -> (Duration, bool) {
        if t < self.last {
            (self.last, true)
        } else {
            self.last = t;
            (t, false)
        }
    }
}
