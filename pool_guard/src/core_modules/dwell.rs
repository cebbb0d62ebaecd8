// THEORY:
// The `DwellTimer` turns a noisy boolean ("someone is in the zone") into a
// duration ("someone has been in the zone for this long without a gap").
//
// It is a two-state machine:
//
//          update(true)                       update(true)
//   Idle ──────────────► Accruing(t0) ◄──────────────────┐
//    ▲                        │  └───────────────────────┘
//    │      update(false)     │
//    └────────────────────────┘
//
// There is no partial credit: a single false observation throws away the whole
// run. The timer keeps reporting "reached" on every true observation once the
// threshold is met; deciding that this should produce only one alarm is the
// arbitrator's job, not the timer's.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Accruing(Duration),
}

/// Tracks how long a condition has been continuously true.
#[derive(Debug, Clone)]
pub struct DwellTimer {
    threshold: Duration,
    state: State,
}

impl DwellTimer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            state: State::Idle,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Feeds one observation and returns whether the condition has now been
    /// true for at least the threshold.
    ///
    /// | State | condition | Next state | Returns |
    /// |-------|-----------|------------|---------|
    /// | any | false | Idle | false |
    /// | Idle | true | Accruing(now) | false |
    /// | Accruing(t0) | true | Accruing(t0) | `now - t0 >= threshold` |
    pub fn update(&mut self, now: Duration, condition: bool) -> bool {
        match (self.state, condition) {
            (_, false) => {
                self.state = State::Idle;
                false
            }
            (State::Idle, true) => {
                self.state = State::Accruing(now);
                false
            }
            (State::Accruing(since), true) => now.saturating_sub(since) >= self.threshold,
        }
    }

    pub fn is_accruing(&self) -> bool {
        matches!(self.state, State::Accruing(_))
    }

    /// How long the current run has lasted, or `None` when idle.
    pub fn elapsed(&self, now: Duration) -> Option<Duration> {
        match self.state {
            State::Idle => None,
            State::Accruing(since) => Some(now.saturating_sub(since)),
        }
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
    }
}
