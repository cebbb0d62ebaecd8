// THEORY:
// The `pipeline` module is the top-level API of the guard. It encapsulates the
// whole per-frame stack behind one call, so a frame loop only has to hand it
// detections and a timestamp and read back a report.
//
// Stages, in order, for every frame:
// 1.  **Clear Input**: sample the debounced clear line; an accepted press
//     drops a latched output. This is never subject to the cooldown.
// 2.  **Area Filter**: discard boxes smaller than `min_box_area`.
// 3.  **Zone Tagging**: mark each remaining detection as in or out of zone.
// 4.  **Arbitration**: fold in the arm state, dwell timer and cooldown gate.
// 5.  **Actuation & Notification**: on a fire, drive the actuator and hand
//     the alert to every sink. Failures here are logged and the frame loop
//     carries on.
//
// The arm flag lives here rather than in the arbitrator because it is driven
// from outside (keyboard, remote command) and only read per frame.

use crate::config::GuardConfig;
use crate::core_modules::actuator::ActuatorDriver;
use crate::core_modules::arbitrator::{Arbitrator, FireEvent};
use crate::core_modules::detection::{Detection, Detector, RawDetection};
use crate::core_modules::geometry::Polygon;
use crate::notify::{AlertPayload, Notifier};
use chrono::Utc;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Operator commands, polled once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleArm,
    Arm,
    Disarm,
    /// Force the alarm output inactive.
    ClearLatch,
    Quit,
}

impl Command {
    /// Single-key bindings of the preview window.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'a' => Some(Command::ToggleArm),
            'c' => Some(Command::ClearLatch),
            'q' => Some(Command::Quit),
            _ => None,
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.trim().to_ascii_lowercase();
        if let [key] = word.as_bytes() {
            return Command::from_key(*key as char).ok_or_else(|| format!("unknown command key `{word}`"));
        }
        match word.as_str() {
            "toggle" => Ok(Command::ToggleArm),
            "arm" => Ok(Command::Arm),
            "disarm" => Ok(Command::Disarm),
            "clear" => Ok(Command::ClearLatch),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(format!("unknown command `{word}`")),
        }
    }
}

/// One frame worth of detector output.
#[derive(Debug, Clone, Default)]
pub struct FrameObservation {
    pub width: u32,
    pub height: u32,
    pub detections: Vec<RawDetection>,
}

/// The primary output of the pipeline for a single frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Detections that passed the area filter, tagged with zone membership.
    pub detections: Vec<Detection>,
    pub armed: bool,
    /// The alarm raised on this frame, if any.
    pub fired: Option<FireEvent>,
    /// Whether the clear input was accepted on this frame.
    pub cleared: bool,
    pub dwell_elapsed: Option<Duration>,
    pub cooldown_remaining: Duration,
}

impl FrameReport {
    pub fn in_zone_count(&self) -> usize {
        self.detections.iter().filter(|d| d.in_zone).count()
    }
}

/// The main, top-level struct for the guard.
pub struct GuardPipeline {
    arbitrator: Arbitrator,
    actuator: Option<ActuatorDriver>,
    notifiers: Vec<Box<dyn Notifier>>,
    armed: bool,
    min_box_area: i64,
    fire_count: u64,
}

impl GuardPipeline {
    pub fn new(arbitrator: Arbitrator, armed: bool, min_box_area: i64) -> Self {
        Self {
            arbitrator,
            actuator: None,
            notifiers: Vec::new(),
            armed,
            min_box_area: min_box_area.max(0),
            fire_count: 0,
        }
    }

    /// Builds the decision stages from a validated config. Outputs are added
    /// with [`with_actuator`](Self::with_actuator) and
    /// [`with_notifier`](Self::with_notifier).
    pub fn from_config(config: &GuardConfig, zone: Polygon) -> Self {
        let arbitrator = Arbitrator::new(zone, config.dwell(), config.cooldown());
        Self::new(arbitrator, config.alarm.enabled_start, config.alarm.min_box_area)
    }

    pub fn with_actuator(mut self, actuator: ActuatorDriver) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn process_frame(&mut self, frame: FrameObservation, now: Duration) -> FrameReport {
        // --- 1. Clear Input ---
        let cleared = self.poll_clear_input(now);

        // --- 2. Area Filter ---
        let min_area = self.min_box_area;
        let kept = frame.detections.into_iter().filter(|d| d.bbox.area() >= min_area);

        // --- 3. Zone Tagging ---
        let detections = self.arbitrator.classify(kept);

        // --- 4. Arbitration ---
        let fired = self
            .arbitrator
            .evaluate(self.armed, &detections, frame.width, frame.height, now);

        // --- 5. Actuation & Notification ---
        if let Some(event) = &fired {
            self.dispatch(event);
        }

        FrameReport {
            detections,
            armed: self.armed,
            fired,
            cleared,
            dwell_elapsed: self.arbitrator.dwell().elapsed(now),
            cooldown_remaining: self.arbitrator.cooldown().remaining(now),
        }
    }

    /// Runs `detector` on `frame` and processes the result. A detector
    /// failure is logged and the frame is treated as empty.
    pub fn process_with<D: Detector>(
        &mut self,
        detector: &mut D,
        frame: &D::Frame,
        width: u32,
        height: u32,
        now: Duration,
    ) -> FrameReport {
        let detections = detector.detect(frame).unwrap_or_else(|e| {
            warn!(error = %e, "detector failed, treating frame as empty");
            Vec::new()
        });
        self.process_frame(
            FrameObservation {
                width,
                height,
                detections,
            },
            now,
        )
    }

    fn poll_clear_input(&mut self, now: Duration) -> bool {
        let Some(actuator) = self.actuator.as_mut() else {
            return false;
        };
        if !actuator.poll_clear_input(now) {
            return false;
        }
        match actuator.clear() {
            Ok(()) => info!("[GPIO] latch cleared by input"),
            Err(e) => warn!(error = %e, "[GPIO] failed to clear latch"),
        }
        true
    }

    fn dispatch(&mut self, event: &FireEvent) {
        self.fire_count += 1;
        info!(
            count = event.in_zone_count,
            at = ?event.at,
            total = self.fire_count,
            "alarm fired"
        );

        if let Some(actuator) = self.actuator.as_mut() {
            if let Err(e) = actuator.trigger() {
                warn!(error = %e, "[GPIO] failed to trigger signal");
            }
        }

        let alert = AlertPayload::from_event(event, Utc::now());
        for notifier in &mut self.notifiers {
            if let Err(e) = notifier.notify(&alert) {
                warn!(sink = notifier.name(), error = %e, "failed to deliver alert");
            }
        }
    }

    /// Applies an operator command. Returns `false` when the loop should stop.
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::ToggleArm => self.set_armed(!self.armed),
            Command::Arm => self.set_armed(true),
            Command::Disarm => self.set_armed(false),
            Command::ClearLatch => match self.actuator.as_mut() {
                Some(actuator) => match actuator.clear() {
                    Ok(()) => info!("[GPIO] latch cleared (inactive level)"),
                    Err(e) => warn!(error = %e, "[GPIO] failed to clear latch"),
                },
                None => debug!("clear requested but no actuator is configured"),
            },
            Command::Quit => return false,
        }
        true
    }

    pub fn set_armed(&mut self, armed: bool) {
        if self.armed != armed {
            info!(armed, "arm state changed");
        }
        self.armed = armed;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn fire_count(&self) -> u64 {
        self.fire_count
    }

    pub fn arbitrator(&self) -> &Arbitrator {
        &self.arbitrator
    }

    pub fn actuator(&self) -> Option<&ActuatorDriver> {
        self.actuator.as_ref()
    }

    /// Resets and releases the actuator now instead of at drop.
    pub fn shutdown(&mut self) {
        if let Some(actuator) = self.actuator.as_mut() {
            actuator.shutdown();
        }
    }
}
