// THEORY:
// The `CooldownGate` enforces a minimum silence between two alarms. It only
// ever gates new fires; clearing an active output is never subject to it.

use std::time::Duration;

/// Minimum interval between successive alarm activations.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    interval: Duration,
    last_fire: Option<Duration>,
}

impl CooldownGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fire: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True if nothing has fired yet or the interval has fully elapsed.
    pub fn ready(&self, now: Duration) -> bool {
        match self.last_fire {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval,
        }
    }

    /// Records an accepted fire. Call only after the alarm has been raised.
    pub fn mark(&mut self, now: Duration) {
        self.last_fire = Some(now);
    }

    /// Time left before the gate reopens.
    pub fn remaining(&self, now: Duration) -> Duration {
        match self.last_fire {
            None => Duration::ZERO,
            Some(last) => self.interval.saturating_sub(now.saturating_sub(last)),
        }
    }

    pub fn last_fire(&self) -> Option<Duration> {
        self.last_fire
    }
}
