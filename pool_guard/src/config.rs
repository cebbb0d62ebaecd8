//! Configuration file model.
//!
//! The guard is configured from a TOML file. Every section has defaults so a
//! minimal file only needs a region of interest:
//!
//! ```toml
//! [roi]
//! file = "roi_pool.toml"
//!
//! [alarm]
//! dwell_seconds = 2.0
//! cooldown_seconds = 30.0
//!
//! [outputs.gpio]
//! enabled = true
//! backend = "sysfs"
//! mode = "latch"
//! clear_input = { pin = 27, pull = "up", debounce_ms = 200 }
//! ```
//!
//! Values are checked once by [`GuardConfig::validate`]; nothing is re-checked
//! per frame.

use crate::core_modules::actuator::{ActuatorConfig, ActuatorMode, ClearInputConfig};
use crate::core_modules::channel::{GpioBoard, Pull, SYSFS_GPIO_ROOT, SimulatedBoard, SysfsBoard};
use crate::core_modules::geometry::{Point, Polygon};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The master configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub roi: RoiConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Camera index (`"0"`) or a file/stream URL.
    #[serde(default = "default_source")]
    pub source: String,
    /// Frames wider than this are scaled down. `0` disables resizing.
    #[serde(default = "default_resize_width")]
    pub resize_width: u32,
    /// Show an annotated preview window.
    #[serde(default)]
    pub display: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// ONNX export of a YOLOv8 detection model.
    #[serde(default = "default_weights")]
    pub weights: PathBuf,
    #[serde(default = "default_conf")]
    pub conf: f32,
    #[serde(default = "default_iou")]
    pub iou: f32,
    /// Square network input size in pixels.
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

/// Where the zone polygon comes from. An inline polygon wins over a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoiConfig {
    pub file: Option<PathBuf>,
    pub polygon: Option<Vec<Point>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Whether the guard starts armed.
    #[serde(default = "default_true")]
    pub enabled_start: bool,
    #[serde(default = "default_dwell_seconds")]
    pub dwell_seconds: f64,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,
    /// Detections with a smaller box area (px²) are ignored.
    #[serde(default)]
    pub min_box_area: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputsConfig {
    #[serde(default)]
    pub gpio: GpioConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    #[default]
    Simulated,
    Sysfs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpioConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub backend: GpioBackend,
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    #[serde(default = "default_pin")]
    pub pin: u32,
    #[serde(default = "default_true")]
    pub active_high: bool,
    /// `"pulse"` or `"latch"`. Other values fall back to a short pulse.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: i64,
    pub clear_input: Option<ClearInputFileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearInputFileConfig {
    pub pin: u32,
    /// Pressed reads high. Defaults to a button to ground.
    #[serde(default)]
    pub active_high: bool,
    #[serde(default = "default_pull")]
    pub pull: Pull,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Log every alert at WARN level.
    #[serde(default = "default_true")]
    pub log: bool,
    /// Write every alert as one JSON line on stdout.
    #[serde(default)]
    pub json_stdout: bool,
}

/// Layout of a standalone ROI file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiFile {
    pub polygon: Vec<Point>,
}

fn default_source() -> String {
    "0".to_string()
}
fn default_resize_width() -> u32 {
    960
}
fn default_weights() -> PathBuf {
    PathBuf::from("yolov8n.onnx")
}
fn default_conf() -> f32 {
    0.5
}
fn default_iou() -> f32 {
    0.45
}
fn default_input_size() -> u32 {
    640
}
fn default_true() -> bool {
    true
}
fn default_dwell_seconds() -> f64 {
    2.0
}
fn default_cooldown_seconds() -> f64 {
    30.0
}
fn default_sysfs_root() -> PathBuf {
    PathBuf::from(SYSFS_GPIO_ROOT)
}
fn default_pin() -> u32 {
    17
}
fn default_mode() -> String {
    "pulse".to_string()
}
fn default_pulse_ms() -> i64 {
    500
}
fn default_pull() -> Pull {
    Pull::Up
}
fn default_debounce_ms() -> i64 {
    200
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            resize_width: default_resize_width(),
            display: false,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            conf: default_conf(),
            iou: default_iou(),
            input_size: default_input_size(),
        }
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            enabled_start: true,
            dwell_seconds: default_dwell_seconds(),
            cooldown_seconds: default_cooldown_seconds(),
            min_box_area: 0,
        }
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: GpioBackend::default(),
            sysfs_root: default_sysfs_root(),
            pin: default_pin(),
            active_high: true,
            mode: default_mode(),
            pulse_ms: default_pulse_ms(),
            clear_input: None,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            log: true,
            json_stdout: false,
        }
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.into(),
    }
}

impl GuardConfig {
    /// Reads, parses and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GuardConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let alarm = &self.alarm;
        if !(alarm.dwell_seconds.is_finite() && alarm.dwell_seconds > 0.0) {
            return Err(invalid("alarm.dwell_seconds", format!("must be > 0, got {}", alarm.dwell_seconds)));
        }
        if !(alarm.cooldown_seconds.is_finite() && alarm.cooldown_seconds >= 0.0) {
            return Err(invalid(
                "alarm.cooldown_seconds",
                format!("must be >= 0, got {}", alarm.cooldown_seconds),
            ));
        }
        if alarm.min_box_area < 0 {
            return Err(invalid("alarm.min_box_area", format!("must be >= 0, got {}", alarm.min_box_area)));
        }
        // Rejects values too large for a Duration as well.
        Duration::try_from_secs_f64(alarm.dwell_seconds).map_err(|e| invalid("alarm.dwell_seconds", e.to_string()))?;
        Duration::try_from_secs_f64(alarm.cooldown_seconds)
            .map_err(|e| invalid("alarm.cooldown_seconds", e.to_string()))?;

        if !(0.0..=1.0).contains(&self.model.conf) {
            return Err(invalid("model.conf", format!("must be within [0, 1], got {}", self.model.conf)));
        }
        if !(0.0..=1.0).contains(&self.model.iou) {
            return Err(invalid("model.iou", format!("must be within [0, 1], got {}", self.model.iou)));
        }
        if self.model.input_size == 0 {
            return Err(invalid("model.input_size", "must be > 0"));
        }

        if let Some(polygon) = &self.roi.polygon {
            Polygon::new(polygon.clone())?;
        } else if self.roi.file.is_none() {
            return Err(ConfigError::MissingRoi);
        }
        Ok(())
    }

    pub fn dwell(&self) -> Duration {
        Duration::try_from_secs_f64(self.alarm.dwell_seconds).unwrap_or(Duration::ZERO)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.alarm.cooldown_seconds).unwrap_or(Duration::ZERO)
    }

    /// Builds the zone polygon. A relative `roi.file` is resolved against
    /// `base_dir`, normally the directory holding the config file.
    pub fn zone(&self, base_dir: &Path) -> Result<Polygon, ConfigError> {
        if let Some(polygon) = &self.roi.polygon {
            return Ok(Polygon::new(polygon.clone())?);
        }
        match &self.roi.file {
            Some(file) => load_roi(&base_dir.join(file)),
            None => Err(ConfigError::MissingRoi),
        }
    }

    /// Actuator settings, or `None` when the GPIO output is disabled.
    /// Pulse width is clamped to at least 1 ms and debounce to at least 0 ms.
    pub fn actuator(&self) -> Option<ActuatorConfig> {
        let gpio = &self.outputs.gpio;
        if !gpio.enabled {
            return None;
        }
        let clear_input = gpio.clear_input.as_ref().map(|input| ClearInputConfig {
            pin: input.pin,
            active_high: input.active_high,
            pull: input.pull,
            debounce: Duration::from_millis(input.debounce_ms.max(0) as u64),
        });
        Some(ActuatorConfig {
            pin: gpio.pin,
            active_high: gpio.active_high,
            mode: ActuatorMode::parse(&gpio.mode),
            pulse: Duration::from_millis(gpio.pulse_ms.max(1) as u64),
            clear_input,
        })
    }
}

impl GpioConfig {
    /// The board for the backend selected by `backend`.
    pub fn board(&self) -> GpioBoard {
        match self.backend {
            GpioBackend::Simulated => GpioBoard::Simulated(SimulatedBoard::new()),
            GpioBackend::Sysfs => GpioBoard::Sysfs(SysfsBoard::new(&self.sysfs_root)),
        }
    }
}

/// Loads a standalone ROI file (`polygon = [[x, y], ...]`).
pub fn load_roi(path: &Path) -> Result<Polygon, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let roi: RoiFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Polygon::new(roi.polygon)?)
}
