// THEORY:
// The `ActuatorDriver` turns an alarm decision into a physical effect on an
// output line, and owns the only way that effect is undone.
//
// Key architectural principles:
// 1.  **Two Behaviors**: In `pulse` mode the line goes active for a fixed
//     width and comes back on its own, blocking the caller for that width. In
//     `latch` mode the line goes active and stays there until `clear`. An
//     unrecognized mode string falls back to a short pulse rather than doing
//     nothing.
// 2.  **Polarity in One Place**: The rest of the system speaks in "active" and
//     "inactive". Only `drive` knows whether active means a high or a low line.
// 3.  **Debounced Clear Input**: An optional input line (a reset button or a
//     relay contact) can clear a latch. The driver samples it when asked and
//     accepts at most one activation per debounce window. A failed read is
//     simply "not pressed".
// 4.  **Scoped Teardown**: The driver owns its lines. Dropping it drives the
//     output inactive and releases every line exactly once, however the frame
//     loop ends.

use crate::core_modules::channel::{ChannelBoard, Pull, SignalChannel};
use crate::error::ChannelError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pulse width used when the configured mode is not recognized.
pub const FALLBACK_PULSE: Duration = Duration::from_millis(200);

/// What `trigger` does with the output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorMode {
    Pulse,
    Latch,
    /// Anything else from the config file. Behaves as a [`FALLBACK_PULSE`].
    Unrecognized(String),
}

impl ActuatorMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pulse" => ActuatorMode::Pulse,
            "latch" => ActuatorMode::Latch,
            _ => ActuatorMode::Unrecognized(raw.to_string()),
        }
    }
}

/// Settings for the optional latch-clearing input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearInputConfig {
    pub pin: u32,
    /// Whether a pressed input reads as a high level.
    pub active_high: bool,
    pub pull: Pull,
    /// Minimum spacing between two accepted clears.
    pub debounce: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorConfig {
    pub pin: u32,
    /// Whether the alarm drives the line high.
    pub active_high: bool,
    pub mode: ActuatorMode,
    /// Pulse width for [`ActuatorMode::Pulse`]. Never shorter than 1 ms.
    pub pulse: Duration,
    pub clear_input: Option<ClearInputConfig>,
}

impl ActuatorConfig {
    /// Physical level that represents the given logical state.
    pub fn level_for(&self, active: bool) -> bool {
        active == self.active_high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
    Inactive,
    /// Only observable from inside `trigger`.
    Pulsing,
    Latched,
}

struct ClearInput {
    config: ClearInputConfig,
    channel: Box<dyn SignalChannel>,
    last_accepted: Option<Duration>,
}

/// Drives the alarm output line.
pub struct ActuatorDriver {
    // --- Configuration ---
    config: ActuatorConfig,

    // --- Owned Lines ---
    output: Box<dyn SignalChannel>,
    clear_input: Option<ClearInput>,

    // --- Runtime State ---
    state: ActuatorState,
    /// Last physical level successfully written, if any.
    level: Option<bool>,
    torn_down: bool,
}

impl ActuatorDriver {
    /// Opens the output (and clear input, when configured) on `board`, with
    /// the output starting at its inactive level.
    pub fn open(config: ActuatorConfig, board: &dyn ChannelBoard) -> Result<Self, ChannelError> {
        let mut output = board.open_output(config.pin, config.level_for(false))?;
        let clear_input = match &config.clear_input {
            Some(input) => match board.open_input(input.pin, input.pull) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    if let Err(release) = output.release() {
                        warn!(error = %release, "failed to release alarm output after open error");
                    }
                    return Err(e);
                }
            },
            None => None,
        };
        if let ActuatorMode::Unrecognized(raw) = &config.mode {
            warn!(mode = %raw, "unrecognized actuator mode, falling back to a {:?} pulse", FALLBACK_PULSE);
        }
        info!(pin = config.pin, mode = ?config.mode, active_high = config.active_high, "actuator ready");
        Ok(Self::with_channels(config, output, clear_input))
    }

    /// Builds a driver around already opened lines. `clear_input` is ignored
    /// unless the config describes one. The pulse width is raised to 1 ms.
    pub fn with_channels(
        mut config: ActuatorConfig,
        output: Box<dyn SignalChannel>,
        clear_input: Option<Box<dyn SignalChannel>>,
    ) -> Self {
        config.pulse = config.pulse.max(Duration::from_millis(1));
        let clear_input = match (config.clear_input.clone(), clear_input) {
            (Some(input_config), Some(channel)) => Some(ClearInput {
                config: input_config,
                channel,
                last_accepted: None,
            }),
            _ => None,
        };
        Self {
            config,
            output,
            clear_input,
            state: ActuatorState::Inactive,
            level: None,
            torn_down: false,
        }
    }

    /// Raises the alarm according to the configured mode.
    ///
    /// In pulse modes this blocks the calling thread for the pulse width and
    /// always attempts to return the line to inactive before returning.
    pub fn trigger(&mut self) -> Result<(), ChannelError> {
        match self.config.mode {
            ActuatorMode::Pulse => self.pulse(self.config.pulse),
            ActuatorMode::Latch => {
                self.drive(true)?;
                self.state = ActuatorState::Latched;
                Ok(())
            }
            ActuatorMode::Unrecognized(_) => self.pulse(FALLBACK_PULSE),
        }
    }

    fn pulse(&mut self, width: Duration) -> Result<(), ChannelError> {
        let previous = self.state;
        self.state = ActuatorState::Pulsing;
        let raised = self.drive(true);
        if raised.is_ok() {
            std::thread::sleep(width);
        }
        let lowered = self.drive(false);
        self.state = match (&raised, &lowered) {
            (_, Ok(())) => ActuatorState::Inactive,
            // The line is stuck active; only `clear` can bring it back.
            (Ok(()), Err(_)) => ActuatorState::Latched,
            (Err(_), Err(_)) => previous,
        };
        raised.and(lowered)
    }

    /// Forces the output to its inactive level. Safe to call in any state.
    /// A failed write leaves the state untouched.
    pub fn clear(&mut self) -> Result<(), ChannelError> {
        self.drive(false)?;
        self.state = ActuatorState::Inactive;
        Ok(())
    }

    /// Samples the clear input. Returns true when a press is accepted, after
    /// which the caller is expected to call [`clear`](Self::clear).
    pub fn poll_clear_input(&mut self, now: Duration) -> bool {
        let Some(input) = self.clear_input.as_mut() else {
            return false;
        };

        let pressed = match input.channel.read_level() {
            Ok(level) => level == input.config.active_high,
            Err(e) => {
                debug!(error = %e, "clear input read failed, treating as released");
                false
            }
        };
        if !pressed {
            return false;
        }

        match input.last_accepted {
            Some(last) if now.saturating_sub(last) < input.config.debounce => false,
            _ => {
                input.last_accepted = Some(now);
                true
            }
        }
    }

    fn drive(&mut self, active: bool) -> Result<(), ChannelError> {
        let level = self.config.level_for(active);
        self.output.set_level(level)?;
        self.level = Some(level);
        Ok(())
    }

    /// Drives the output inactive and releases all lines. Runs once; later
    /// calls (including the one from `Drop`) do nothing.
    pub fn shutdown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.clear() {
            warn!(error = %e, "failed to reset alarm output during teardown");
        }
        if let Err(e) = self.output.release() {
            warn!(error = %e, "failed to release alarm output");
        }
        if let Some(input) = self.clear_input.as_mut() {
            if let Err(e) = input.channel.release() {
                warn!(error = %e, "failed to release clear input");
            }
        }
        info!(output = %self.output.describe(), "actuator released");
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn level(&self) -> Option<bool> {
        self.level
    }

    pub fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    pub fn has_clear_input(&self) -> bool {
        self.clear_input.is_some()
    }
}

impl Drop for ActuatorDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
