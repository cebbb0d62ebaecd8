//! Error types for configuration loading, geometry, signal channels and
//! notification sinks.
//!
//! Only [`ConfigError`] and [`GeometryError`] are fatal, and only at startup.
//! Channel and sink errors are reported per frame and logged by the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building the region of interest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// A zone polygon needs at least three vertices to enclose an area.
    #[error("Polygon needs at least 3 vertices, got {got}")]
    TooFewVertices { got: usize },
}

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the expected layout.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A recognized key holds a value outside its allowed range.
    #[error("Invalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    /// Neither `roi.file` nor `roi.polygon` was given.
    #[error("No region of interest configured (set `roi.file` or `roi.polygon`)")]
    MissingRoi,

    /// The configured region of interest is not a usable polygon.
    #[error("Invalid region of interest: {0}")]
    Roi(#[from] GeometryError),
}

/// Errors raised by a [`SignalChannel`](crate::core_modules::channel::SignalChannel).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying device file could not be accessed.
    #[error("GPIO {pin}: {op} failed: {source}")]
    Io {
        pin: u32,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The device returned something other than a logic level.
    #[error("GPIO {pin}: unexpected value {value:?}")]
    BadValue { pin: u32, value: String },

    /// The channel was released and can no longer be driven.
    #[error("GPIO {pin}: channel already released")]
    Released { pin: u32 },

    /// A failure injected into a simulated channel.
    #[error("GPIO {pin}: simulated failure")]
    Simulated { pin: u32 },
}

/// Errors raised while delivering an alert to a sink.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to serialize alert: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write alert: {0}")]
    Io(#[from] std::io::Error),
}
