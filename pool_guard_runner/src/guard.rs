// THEORY:
// This module is the glue between a loaded configuration and a running guard.
// `assemble` turns the config into a `GuardPipeline` with its actuator and
// alert sinks attached; `run` is the single-threaded frame loop that feeds it.
//
// Key architectural principles:
// 1.  **One thread owns the guard:** Commands from signals, stdin, replay
//     lines and preview keys all funnel into `GuardPipeline::apply` on the
//     frame thread, drained once per frame.
// 2.  **Hardware is optional at runtime:** A GPIO line that fails to open is
//     logged and the guard keeps running without an output, while bad config
//     or an unreadable zone stops startup.
// 3.  **Same loop for every source:** Replays and cameras differ only in the
//     `FrameSource` they plug in and in where timestamps come from.

use crate::source::FrameSource;
use anyhow::Context;
use pool_guard::core_modules::actuator::ActuatorDriver;
use pool_guard::core_modules::channel::SimulatedProbe;
use pool_guard::core_modules::clock::SessionClock;
use pool_guard::notify::{JsonLinesNotifier, LogNotifier};
use pool_guard::{Command, GuardConfig, GuardPipeline};
use std::path::Path;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Scripted access to a simulated clear input, in logical terms.
#[derive(Debug, Clone)]
pub struct ScriptedClearInput {
    probe: SimulatedProbe,
    active_high: bool,
}

impl ScriptedClearInput {
    /// Holds the input pressed (`true`) or released (`false`).
    pub fn press(&self, pressed: bool) {
        self.probe.force_input(Some(pressed == self.active_high));
    }
}

pub struct Assembly {
    pub pipeline: GuardPipeline,
    /// Present only with the simulated backend and a configured clear input.
    pub clear_input: Option<ScriptedClearInput>,
}

/// Builds the pipeline described by `config`. Relative paths in the config
/// are resolved against `base_dir`.
pub fn assemble(config: &GuardConfig, base_dir: &Path) -> anyhow::Result<Assembly> {
    let zone = config.zone(base_dir).context("failed to load the zone polygon")?;
    info!(vertices = zone.vertices().len(), "zone loaded");

    let mut pipeline = GuardPipeline::from_config(config, zone);
    let mut clear_input = None;

    // --- 1. Actuator ---
    if let Some(actuator_config) = config.actuator() {
        let gpio = &config.outputs.gpio;
        let board = gpio.board();
        let scripted = actuator_config.clear_input.as_ref().map(|c| (c.pin, c.active_high));

        match ActuatorDriver::open(actuator_config, &board) {
            Ok(driver) => {
                info!(pin = gpio.pin, mode = %gpio.mode, backend = ?gpio.backend, "[GPIO] actuator ready");
                pipeline = pipeline.with_actuator(driver);
                clear_input = board.simulated().zip(scripted).and_then(|(simulated, (pin, active_high))| {
                    simulated
                        .probe(pin)
                        .map(|probe| ScriptedClearInput { probe, active_high })
                });
            }
            Err(e) => warn!(error = %e, "[GPIO] actuator unavailable, continuing without an output"),
        }
    } else {
        info!("[GPIO] output disabled");
    }

    // --- 2. Alert Sinks ---
    let notify = &config.outputs.notify;
    if notify.log {
        pipeline = pipeline.with_notifier(Box::new(LogNotifier));
    }
    if notify.json_stdout {
        pipeline = pipeline.with_notifier(Box::new(JsonLinesNotifier::stdout()));
    }

    Ok(Assembly { pipeline, clear_input })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub fires: u64,
    /// Whether the loop ended on a `Quit` rather than end of stream.
    pub quit: bool,
}

/// The main frame loop. Returns at end of stream or on `Quit`.
pub fn run(
    pipeline: &mut GuardPipeline,
    source: &mut dyn FrameSource,
    commands: &mut UnboundedReceiver<Command>,
    clear_input: Option<&ScriptedClearInput>,
) -> anyhow::Result<LoopSummary> {
    let clock = SessionClock::start();
    let mut summary = LoopSummary::default();
    info!(source = %source.describe(), armed = pipeline.is_armed(), "frame loop started");

    'frames: loop {
        // --- 1. Queued Commands ---
        while let Ok(command) = commands.try_recv() {
            if !pipeline.apply(command) {
                summary.quit = true;
                break 'frames;
            }
        }

        // --- 2. Acquire ---
        let Some(frame) = source.next_frame()? else {
            info!("end of stream");
            break;
        };
        for command in frame.commands {
            if !pipeline.apply(command) {
                summary.quit = true;
                break 'frames;
            }
        }
        if let Some(pressed) = frame.clear_input {
            match clear_input {
                Some(input) => input.press(pressed),
                None => debug!("scripted clear input ignored, no simulated input configured"),
            }
        }

        // --- 3. Process ---
        let now = frame.recorded_at.unwrap_or_else(|| clock.now());
        let report = source.process(pipeline, frame.observation, now);
        summary.frames += 1;
        debug!(
            in_zone = report.in_zone_count(),
            armed = report.armed,
            dwell = ?report.dwell_elapsed,
            "frame processed"
        );

        // --- 4. Present ---
        for command in source.present(&report)? {
            if !pipeline.apply(command) {
                summary.quit = true;
                break 'frames;
            }
        }
    }

    summary.fires = pipeline.fire_count();
    info!(frames = summary.frames, fires = summary.fires, "frame loop finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplaySource;
    use crate::source::SourceFrame;
    use pool_guard::config::GpioBackend;
    use pool_guard::core_modules::actuator::ActuatorState;
    use pool_guard::core_modules::detection::{BoundingBox, Detector, RawDetection};
    use pool_guard::{FrameObservation, FrameReport};
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const ZONE_CONFIG: &str = r#"
        [roi]
        polygon = [[0, 0], [100, 0], [100, 100], [0, 100]]

        [alarm]
        dwell_seconds = 2.0
        cooldown_seconds = 5.0

        [outputs.gpio]
        enabled = true
        mode = "latch"
        pin = 17
        active_high = true

        [outputs.gpio.clear_input]
        pin = 27
        active_high = false
        pull = "up"
        debounce_ms = 100

        [outputs.notify]
        log = false
    "#;

    fn config() -> GuardConfig {
        let config: GuardConfig = toml::from_str(ZONE_CONFIG).unwrap();
        config.validate().unwrap();
        config
    }

    fn replay(lines: &[String]) -> ReplaySource<Cursor<Vec<u8>>> {
        ReplaySource::new(Cursor::new(lines.join("\n").into_bytes()), "scenario")
    }

    fn person_at(t: f64) -> String {
        format!(r#"{{"t": {t}, "width": 640, "height": 480, "detections": [{{"bbox": [40, 40, 60, 60], "conf": 0.9}}]}}"#)
    }

    fn empty_at(t: f64) -> String {
        format!(r#"{{"t": {t}, "width": 640, "height": 480, "detections": []}}"#)
    }

    #[test]
    fn replay_fires_after_dwell_and_latches() {
        let mut assembly = assemble(&config(), Path::new(".")).unwrap();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut source = replay(&[person_at(0.0), person_at(1.0), person_at(2.0), empty_at(3.0)]);

        let summary = run(&mut assembly.pipeline, &mut source, &mut rx, assembly.clear_input.as_ref()).unwrap();

        assert_eq!(summary, LoopSummary { frames: 4, fires: 1, quit: false });
        let actuator = assembly.pipeline.actuator().unwrap();
        assert_eq!(actuator.state(), ActuatorState::Latched);
        assert_eq!(actuator.level(), Some(true));
    }

    #[test]
    fn scripted_clear_input_releases_latch() {
        let mut assembly = assemble(&config(), Path::new(".")).unwrap();
        assert!(assembly.clear_input.is_some());
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let pressed = r#"{"t": 4.0, "width": 640, "height": 480, "clear_input": true}"#.to_string();
        let mut source = replay(&[person_at(0.0), person_at(2.0), pressed]);

        run(&mut assembly.pipeline, &mut source, &mut rx, assembly.clear_input.as_ref()).unwrap();

        let actuator = assembly.pipeline.actuator().unwrap();
        assert_eq!(actuator.state(), ActuatorState::Inactive);
        assert_eq!(actuator.level(), Some(false));
    }

    #[test]
    fn queued_quit_stops_before_the_first_frame() {
        let mut assembly = assemble(&config(), Path::new(".")).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Command::Quit).unwrap();
        let mut source = replay(&[person_at(0.0)]);

        let summary = run(&mut assembly.pipeline, &mut source, &mut rx, None).unwrap();
        assert_eq!(summary, LoopSummary { frames: 0, fires: 0, quit: true });
    }

    #[test]
    fn replayed_disarm_prevents_firing() {
        let mut assembly = assemble(&config(), Path::new(".")).unwrap();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let disarm = r#"{"t": 0.0, "width": 640, "height": 480, "command": "disarm"}"#.to_string();
        let mut source = replay(&[disarm, person_at(0.5), person_at(3.0), person_at(6.0)]);

        let summary = run(&mut assembly.pipeline, &mut source, &mut rx, None).unwrap();
        assert_eq!(summary.fires, 0);
        assert!(!assembly.pipeline.is_armed());
    }

    #[test]
    fn stdout_alerts_leave_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.outputs.gpio.enabled = false;
        config.outputs.notify.json_stdout = true;

        let mut assembly = assemble(&config, dir.path()).unwrap();
        assert!(assembly.pipeline.actuator().is_none());
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut source = replay(&[person_at(0.0), person_at(2.5)]);
        let summary = run(&mut assembly.pipeline, &mut source, &mut rx, None).unwrap();
        drop(assembly);

        assert_eq!(summary.fires, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// A live-style source: frames carry dimensions only and a detector
    /// produces the boxes.
    struct DetectingSource {
        frames: Vec<bool>,
        detector: FlakyDetector,
    }

    /// Sees a person in the zone, or fails when the frame is marked `false`.
    struct FlakyDetector;

    impl Detector for FlakyDetector {
        type Frame = bool;
        type Error = String;

        fn detect(&mut self, frame: &bool) -> Result<Vec<RawDetection>, String> {
            if *frame {
                Ok(vec![RawDetection::new(BoundingBox::new(40, 40, 60, 60), 0.9)])
            } else {
                Err("inference failed".to_string())
            }
        }
    }

    impl FrameSource for DetectingSource {
        fn next_frame(&mut self) -> anyhow::Result<Option<SourceFrame>> {
            if self.frames.is_empty() {
                return Ok(None);
            }
            let t = Duration::from_secs(self.frames.len() as u64);
            Ok(Some(SourceFrame {
                observation: FrameObservation {
                    width: 640,
                    height: 480,
                    detections: Vec::new(),
                },
                recorded_at: Some(Duration::from_secs(10) - t),
                ..SourceFrame::default()
            }))
        }

        fn process(&mut self, pipeline: &mut GuardPipeline, observation: FrameObservation, now: Duration) -> FrameReport {
            let frame = self.frames.remove(0);
            pipeline.process_with(&mut self.detector, &frame, observation.width, observation.height, now)
        }

        fn describe(&self) -> String {
            "detecting".to_string()
        }
    }

    #[test]
    fn detector_sources_run_through_the_pipeline() {
        let mut assembly = assemble(&config(), Path::new(".")).unwrap();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        // The failed inference at t=7 counts as an empty frame and resets
        // dwell, so the run from t=8 is one second short of firing.
        let mut source = DetectingSource {
            frames: vec![true, true, false, true, true],
            detector: FlakyDetector,
        };

        let summary = run(&mut assembly.pipeline, &mut source, &mut rx, None).unwrap();
        assert_eq!(summary, LoopSummary { frames: 5, fires: 0, quit: false });
        assert!(assembly.pipeline.arbitrator().dwell().is_accruing());
    }

    #[test]
    fn bundled_demo_fires_once_and_clears() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
        let mut config = GuardConfig::load(&dir.join("pool_guard.toml")).unwrap();
        config.outputs.notify.json_stdout = false;
        config.outputs.notify.log = false;

        let mut assembly = assemble(&config, &dir).unwrap();
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut source = ReplaySource::open(&dir.join("demo_replay.jsonl")).unwrap();
        let summary = run(&mut assembly.pipeline, &mut source, &mut rx, assembly.clear_input.as_ref()).unwrap();

        assert_eq!(summary.frames, 11);
        assert_eq!(summary.fires, 1);
        assert!(!assembly.pipeline.is_armed());
        assert_eq!(assembly.pipeline.actuator().unwrap().state(), ActuatorState::Inactive);
    }

    #[test]
    fn unopenable_sysfs_line_degrades_to_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.outputs.gpio.backend = GpioBackend::Sysfs;
        config.outputs.gpio.sysfs_root = dir.path().join("missing");

        let assembly = assemble(&config, dir.path()).unwrap();
        assert!(assembly.pipeline.actuator().is_none());
        assert!(assembly.clear_input.is_none());
    }

    #[test]
    fn sysfs_backend_never_scripts_the_clear_input() {
        let dir = tempfile::tempdir().unwrap();
        for pin in [17, 27] {
            let line = dir.path().join(format!("gpio{pin}"));
            std::fs::create_dir_all(&line).unwrap();
            std::fs::write(line.join("direction"), "in").unwrap();
            std::fs::write(line.join("value"), "1").unwrap();
        }
        let mut config = config();
        config.outputs.gpio.backend = GpioBackend::Sysfs;
        config.outputs.gpio.sysfs_root = dir.path().to_path_buf();

        let assembly = assemble(&config, dir.path()).unwrap();
        assert!(assembly.pipeline.actuator().is_some());
        assert!(assembly.clear_input.is_none());
    }
}
