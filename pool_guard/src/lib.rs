// THEORY:
// This file is the main entry point for the `pool_guard` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the `pool_guard_runner`
// frame loop).
//
// The primary goal is to export the `GuardPipeline` and its associated data
// structures (`FrameObservation`, `FrameReport`, `Command`) as the clean,
// high-level interface for the whole guard. The decision stages and hardware
// lines (`core_modules`) stay public for callers that want to assemble their
// own loop, but the pipeline is the intended way in.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod notify;
pub mod pipeline;

pub use config::GuardConfig;
pub use error::{ChannelError, ConfigError, GeometryError, NotifyError};
pub use pipeline::{Command, FrameObservation, FrameReport, GuardPipeline};
