// THEORY:
// The `channel` module is the only place that touches signal hardware. A
// `SignalChannel` is an owned handle to one digital line; nothing about GPIO
// lives in process-wide state.
//
// Key architectural principles:
// 1.  **Capability, not Library**: Callers see two verbs, `set_level` and
//     `read_level`, plus `release` for teardown. Whether the line is a real
//     sysfs GPIO or a simulated one is decided once, when the board opens it.
// 2.  **Failure is Normal**: Missing hardware, permissions and unplugged lines
//     are expected in the field. Every operation returns a `Result` and the
//     layers above decide how to degrade.
// 3.  **Observable Simulation**: The simulated board logs every write and keeps
//     its levels in shared memory so a replay run or a test can look at exactly
//     what the hardware would have seen.

use crate::error::ChannelError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Input bias resistor setting for a clear-input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    Up,
    Down,
    #[default]
    Off,
}

impl Pull {
    /// Level an unconnected line settles at.
    pub fn idle_level(self) -> bool {
        matches!(self, Pull::Up)
    }
}

/// One digital line.
pub trait SignalChannel: Send {
    /// Drives the line to the given physical level.
    fn set_level(&mut self, high: bool) -> Result<(), ChannelError>;

    /// Samples the physical level of the line.
    fn read_level(&mut self) -> Result<bool, ChannelError>;

    /// Returns the line to the system. Further operations fail.
    fn release(&mut self) -> Result<(), ChannelError>;

    fn describe(&self) -> String;
}

/// Opens channels for a particular hardware backend.
pub trait ChannelBoard {
    fn open_output(&self, pin: u32, initial_high: bool) -> Result<Box<dyn SignalChannel>, ChannelError>;
    fn open_input(&self, pin: u32, pull: Pull) -> Result<Box<dyn SignalChannel>, ChannelError>;
}

// --- Simulated backend ---

#[derive(Debug)]
struct SimulatedLine {
    level: bool,
    writes: Vec<bool>,
    idle: bool,
    forced_input: Option<bool>,
    fail_writes: bool,
    fail_reads: bool,
    released: bool,
    release_count: u32,
}

/// Shared view of a simulated line, kept by whoever wants to watch or poke it.
#[derive(Debug, Clone)]
pub struct SimulatedProbe {
    pin: u32,
    line: Arc<Mutex<SimulatedLine>>,
}

impl SimulatedProbe {
    fn line(&self) -> MutexGuard<'_, SimulatedLine> {
        self.line.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Current physical level.
    pub fn level(&self) -> bool {
        self.line().level
    }

    /// Every level written since the line was opened, oldest first.
    pub fn writes(&self) -> Vec<bool> {
        self.line().writes.clone()
    }

    /// Forces what reads return. `None` restores the pull-bias idle level.
    pub fn force_input(&self, level: Option<bool>) {
        self.line().forced_input = level;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.line().fail_writes = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.line().fail_reads = fail;
    }

    pub fn is_released(&self) -> bool {
        self.line().released
    }

    pub fn release_count(&self) -> u32 {
        self.line().release_count
    }
}

/// A logging stand-in for a GPIO line.
#[derive(Debug)]
pub struct SimulatedChannel {
    probe: SimulatedProbe,
    is_output: bool,
}

impl SimulatedChannel {
    pub fn output(pin: u32, initial_high: bool) -> Self {
        info!(pin, initial_high, "[GPIO-SIM] output line opened");
        Self::open(pin, initial_high, false, true)
    }

    pub fn input(pin: u32, pull: Pull) -> Self {
        info!(pin, ?pull, "[GPIO-SIM] input line opened");
        Self::open(pin, pull.idle_level(), pull.idle_level(), false)
    }

    fn open(pin: u32, level: bool, idle: bool, is_output: bool) -> Self {
        let line = SimulatedLine {
            level,
            writes: Vec::new(),
            idle,
            forced_input: None,
            fail_writes: false,
            fail_reads: false,
            released: false,
            release_count: 0,
        };
        Self {
            probe: SimulatedProbe {
                pin,
                line: Arc::new(Mutex::new(line)),
            },
            is_output,
        }
    }

    pub fn probe(&self) -> SimulatedProbe {
        self.probe.clone()
    }
}

impl SignalChannel for SimulatedChannel {
    fn set_level(&mut self, high: bool) -> Result<(), ChannelError> {
        let pin = self.probe.pin;
        let mut line = self.probe.line();
        if line.released {
            return Err(ChannelError::Released { pin });
        }
        if line.fail_writes {
            return Err(ChannelError::Simulated { pin });
        }
        line.level = high;
        line.writes.push(high);
        debug!(pin, high, "[GPIO-SIM] output");
        Ok(())
    }

    fn read_level(&mut self) -> Result<bool, ChannelError> {
        let pin = self.probe.pin;
        let line = self.probe.line();
        if line.released {
            return Err(ChannelError::Released { pin });
        }
        if line.fail_reads {
            return Err(ChannelError::Simulated { pin });
        }
        if self.is_output {
            Ok(line.level)
        } else {
            Ok(line.forced_input.unwrap_or(line.idle))
        }
    }

    fn release(&mut self) -> Result<(), ChannelError> {
        let pin = self.probe.pin;
        let mut line = self.probe.line();
        if line.released {
            return Err(ChannelError::Released { pin });
        }
        line.released = true;
        line.release_count += 1;
        info!(pin, "[GPIO-SIM] cleanup");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated GPIO {}", self.probe.pin)
    }
}

/// Hands out simulated lines and remembers them by pin.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    lines: Arc<Mutex<HashMap<u32, SimulatedProbe>>>,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently opened line on `pin`.
    pub fn probe(&self, pin: u32) -> Option<SimulatedProbe> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&pin)
            .cloned()
    }

    fn register(&self, channel: SimulatedChannel) -> Box<dyn SignalChannel> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(channel.probe.pin, channel.probe());
        Box::new(channel)
    }
}

impl ChannelBoard for SimulatedBoard {
    fn open_output(&self, pin: u32, initial_high: bool) -> Result<Box<dyn SignalChannel>, ChannelError> {
        Ok(self.register(SimulatedChannel::output(pin, initial_high)))
    }

    fn open_input(&self, pin: u32, pull: Pull) -> Result<Box<dyn SignalChannel>, ChannelError> {
        Ok(self.register(SimulatedChannel::input(pin, pull)))
    }
}

// --- Linux sysfs backend ---

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A GPIO line driven through the legacy `/sys/class/gpio` interface.
#[derive(Debug)]
pub struct SysfsChannel {
    pin: u32,
    root: PathBuf,
    exported_here: bool,
    released: bool,
}

impl SysfsChannel {
    fn open(root: &Path, pin: u32, direction: &str) -> Result<Self, ChannelError> {
        let line_dir = root.join(format!("gpio{pin}"));
        let exported_here = if line_dir.exists() {
            false
        } else {
            write_attr(pin, "export", &root.join("export"), &pin.to_string())?;
            true
        };

        let channel = Self {
            pin,
            root: root.to_path_buf(),
            exported_here,
            released: false,
        };
        if let Err(e) = write_attr(pin, "direction", &channel.attr("direction"), direction) {
            if exported_here {
                if let Err(undo) = write_attr(pin, "unexport", &root.join("unexport"), &pin.to_string()) {
                    warn!(pin, error = %undo, "failed to unexport line after open error");
                }
            }
            return Err(e);
        }
        Ok(channel)
    }

    fn attr(&self, name: &str) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin)).join(name)
    }
}

fn write_attr(pin: u32, op: &'static str, path: &Path, value: &str) -> Result<(), ChannelError> {
    fs::write(path, value).map_err(|source| ChannelError::Io { pin, op, source })
}

impl SignalChannel for SysfsChannel {
    fn set_level(&mut self, high: bool) -> Result<(), ChannelError> {
        if self.released {
            return Err(ChannelError::Released { pin: self.pin });
        }
        write_attr(self.pin, "write value", &self.attr("value"), if high { "1" } else { "0" })
    }

    fn read_level(&mut self) -> Result<bool, ChannelError> {
        if self.released {
            return Err(ChannelError::Released { pin: self.pin });
        }
        let raw = fs::read_to_string(self.attr("value")).map_err(|source| ChannelError::Io {
            pin: self.pin,
            op: "read value",
            source,
        })?;
        match raw.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(ChannelError::BadValue {
                pin: self.pin,
                value: other.to_string(),
            }),
        }
    }

    fn release(&mut self) -> Result<(), ChannelError> {
        if self.released {
            return Err(ChannelError::Released { pin: self.pin });
        }
        self.released = true;
        if self.exported_here {
            write_attr(self.pin, "unexport", &self.root.join("unexport"), &self.pin.to_string())?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sysfs GPIO {}", self.pin)
    }
}

/// Opens lines under a sysfs GPIO root, normally [`SYSFS_GPIO_ROOT`].
#[derive(Debug, Clone)]
pub struct SysfsBoard {
    root: PathBuf,
}

impl SysfsBoard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsBoard {
    fn default() -> Self {
        Self::new(SYSFS_GPIO_ROOT)
    }
}

impl ChannelBoard for SysfsBoard {
    fn open_output(&self, pin: u32, initial_high: bool) -> Result<Box<dyn SignalChannel>, ChannelError> {
        // "high"/"low" set direction and initial value in one write, without a glitch.
        let direction = if initial_high { "high" } else { "low" };
        Ok(Box::new(SysfsChannel::open(&self.root, pin, direction)?))
    }

    fn open_input(&self, pin: u32, pull: Pull) -> Result<Box<dyn SignalChannel>, ChannelError> {
        if pull != Pull::Off {
            warn!(pin, ?pull, "sysfs cannot set pull bias; configure it in the device tree");
        }
        Ok(Box::new(SysfsChannel::open(&self.root, pin, "in")?))
    }
}

/// One of the concrete boards, picked at startup.
#[derive(Debug, Clone)]
pub enum GpioBoard {
    Simulated(SimulatedBoard),
    Sysfs(SysfsBoard),
}

impl GpioBoard {
    /// The simulated board, for callers that script or watch its lines.
    pub fn simulated(&self) -> Option<&SimulatedBoard> {
        match self {
            GpioBoard::Simulated(board) => Some(board),
            GpioBoard::Sysfs(_) => None,
        }
    }
}

impl ChannelBoard for GpioBoard {
    fn open_output(&self, pin: u32, initial_high: bool) -> Result<Box<dyn SignalChannel>, ChannelError> {
        match self {
            GpioBoard::Simulated(board) => board.open_output(pin, initial_high),
            GpioBoard::Sysfs(board) => board.open_output(pin, initial_high),
        }
    }

    fn open_input(&self, pin: u32, pull: Pull) -> Result<Box<dyn SignalChannel>, ChannelError> {
        match self {
            GpioBoard::Simulated(board) => board.open_input(pin, pull),
            GpioBoard::Sysfs(board) => board.open_input(pin, pull),
        }
    }
}
