// THEORY:
// `pool_guard_runner` is the executable face of the guard. It loads the
// configuration, wires the pipeline to its actuator and alert sinks, and then
// drives it from one of two frame sources: a recorded replay of detections or
// (with the `camera` feature) a live camera running a YOLOv8 model.
//
// The tokio runtime only listens. Signals and stdin commands are queued on a
// channel while the frame loop runs on a blocking thread and drains that
// queue once per frame, so every piece of guard state stays on one thread.

mod guard;
mod input;
mod replay;
mod source;
#[cfg_attr(not(feature = "camera"), allow(dead_code))]
mod yolo;

#[cfg(feature = "camera")]
mod camera;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pool_guard::{Command, GuardConfig};
use replay::ReplaySource;
use source::FrameSource;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pool_guard_runner", version, about = "Dwell-and-cooldown person alarm for a pool zone")]
struct Cli {
    /// Guard configuration (TOML). Relative paths inside it resolve against
    /// its directory.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `pool_guard=debug,info`. Overrides RUST_LOG.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    no_stdin: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Replay recorded detections from a JSON-lines file.
    Replay {
        file: PathBuf,
        /// Release frames at their recorded pace instead of as fast as possible.
        #[arg(long)]
        realtime: bool,
    },
    /// Run on the configured video source with the ONNX person detector.
    #[cfg(feature = "camera")]
    Camera,
}

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log filter `{level}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    // --- 1. Configuration ---
    let config = GuardConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    let base_dir = cli.config.parent().map(Path::to_path_buf).unwrap_or_default();
    info!(
        config = %cli.config.display(),
        dwell = config.alarm.dwell_seconds,
        cooldown = config.alarm.cooldown_seconds,
        armed = config.alarm.enabled_start,
        "configuration loaded"
    );

    // --- 2. Asynchronous Inputs ---
    let (tx, mut rx) = mpsc::unbounded_channel();
    input::spawn_signal_listener(tx.clone());
    if !cli.no_stdin {
        input::spawn_stdin_reader(tx);
    }

    // --- 3. Frame Loop ---
    let mode = cli.mode;
    let summary = tokio::task::spawn_blocking(move || run_guard(mode, &config, &base_dir, &mut rx))
        .await
        .context("frame loop panicked")??;

    info!(
        frames = summary.frames,
        fires = summary.fires,
        quit = summary.quit,
        "pool guard stopped"
    );
    Ok(())
}

fn run_guard(
    mode: Mode,
    config: &GuardConfig,
    base_dir: &Path,
    commands: &mut UnboundedReceiver<Command>,
) -> anyhow::Result<guard::LoopSummary> {
    let mut assembly = guard::assemble(config, base_dir)?;

    let mut source: Box<dyn FrameSource> = match mode {
        Mode::Replay { file, realtime } => {
            let replay = ReplaySource::open(&file)?;
            Box::new(if realtime { replay.realtime() } else { replay })
        }
        #[cfg(feature = "camera")]
        Mode::Camera => Box::new(camera::CameraSource::open(
            &config.video,
            &config.model,
            assembly.pipeline.arbitrator().zone(),
            base_dir,
        )?),
    };

    let result = guard::run(
        &mut assembly.pipeline,
        source.as_mut(),
        commands,
        assembly.clear_input.as_ref(),
    );
    assembly.pipeline.shutdown();
    result
}
