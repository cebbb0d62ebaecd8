// THEORY:
// A replay file is a recorded session: one JSON object per line holding the
// detector output of one frame and its offset from the start of the session.
// Feeding it through the same loop as the camera makes the whole guard
// deterministic and runnable on machines without a camera or a model.
//
// Key architectural principles:
// 1.  **Recorded time wins:** Frames carry their own timestamps. They are
//     forced non-decreasing so a badly spliced file cannot make dwell or
//     cooldown run backwards.
// 2.  **Scripted side inputs:** A line may also flip the simulated clear
//     input or inject an operator command, so latch and arm scenarios can be
//     replayed end to end.
// 3.  **Fail loudly on bad input:** A malformed line stops the run with its
//     line number instead of being skipped silently.

use crate::source::{FrameSource, SourceFrame};
use anyhow::{Context, bail};
use pool_guard::core_modules::clock::{MonotonicGuard, SessionClock};
use pool_guard::core_modules::detection::RawDetection;
use pool_guard::{Command, FrameObservation};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRecord {
    /// Seconds since the session started.
    pub t: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
    #[serde(default)]
    pub clear_input: Option<bool>,
    #[serde(default)]
    pub command: Option<String>,
}

pub struct ReplaySource<R: BufRead> {
    reader: R,
    label: String,
    line_no: usize,
    clock: MonotonicGuard,
    /// When set, frames are released no earlier than their recorded offset.
    pacing: Option<SessionClock>,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open replay {}", path.display()))?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
            line_no: 0,
            clock: MonotonicGuard::new(),
            pacing: None,
        }
    }

    /// Sleeps before each frame until its recorded offset has passed.
    pub fn realtime(mut self) -> Self {
        self.pacing = Some(SessionClock::start());
        self
    }

    fn parse_line(&mut self, line: &str) -> anyhow::Result<SourceFrame> {
        let record: ReplayRecord = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: malformed replay record", self.label, self.line_no))?;
        let Ok(t) = Duration::try_from_secs_f64(record.t) else {
            bail!("{}:{}: timestamp must be a non-negative number of seconds", self.label, self.line_no);
        };

        let (at, held) = self.clock.observe(t);
        if held {
            warn!(line = self.line_no, t = record.t, "replay timestamp went backwards, holding previous");
        }

        let mut commands = Vec::new();
        if let Some(raw) = record.command.as_deref() {
            let command = raw
                .parse::<Command>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("{}:{}: bad command", self.label, self.line_no))?;
            commands.push(command);
        }

        Ok(SourceFrame {
            observation: FrameObservation {
                width: record.width,
                height: record.height,
                detections: record.detections,
            },
            recorded_at: Some(at),
            clear_input: record.clear_input,
            commands,
        })
    }
}

impl<R: BufRead> FrameSource for ReplaySource<R> {
    fn next_frame(&mut self) -> anyhow::Result<Option<SourceFrame>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .with_context(|| format!("failed to read {}", self.label))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let frame = self.parse_line(trimmed)?;
            if let (Some(clock), Some(at)) = (self.pacing.as_ref(), frame.recorded_at) {
                let now = clock.now();
                if at > now {
                    std::thread::sleep(at - now);
                }
            }
            debug!(line = self.line_no, detections = frame.observation.detections.len(), "replay frame");
            return Ok(Some(frame));
        }
    }

    fn describe(&self) -> String {
        format!("replay {}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_guard::core_modules::detection::BoundingBox;
    use std::io::Cursor;

    fn source(text: &str) -> ReplaySource<Cursor<Vec<u8>>> {
        ReplaySource::new(Cursor::new(text.as_bytes().to_vec()), "test")
    }

    #[test]
    fn reads_frames_and_skips_comments() {
        let mut src = source(
            "# recorded at the shallow end\n\
             {\"t\": 0.0, \"width\": 640, \"height\": 480, \"detections\": []}\n\
             \n\
             {\"t\": 0.5, \"width\": 640, \"height\": 480, \"detections\": [{\"bbox\": [10, 20, 30, 40], \"conf\": 0.8}]}\n",
        );

        let first = src.next_frame().unwrap().unwrap();
        assert_eq!(first.recorded_at, Some(Duration::ZERO));
        assert!(first.observation.detections.is_empty());

        let second = src.next_frame().unwrap().unwrap();
        assert_eq!(second.recorded_at, Some(Duration::from_millis(500)));
        assert_eq!(second.observation.detections[0].bbox, BoundingBox::new(10, 20, 30, 40));
        assert_eq!(second.observation.width, 640);

        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut src = source(
            "{\"t\": 2.0, \"width\": 1, \"height\": 1}\n\
             {\"t\": 1.0, \"width\": 1, \"height\": 1}\n",
        );
        src.next_frame().unwrap();
        let held = src.next_frame().unwrap().unwrap();
        assert_eq!(held.recorded_at, Some(Duration::from_secs(2)));
    }

    #[test]
    fn side_inputs_are_carried() {
        let mut src = source("{\"t\": 1.0, \"width\": 1, \"height\": 1, \"clear_input\": true, \"command\": \"disarm\"}\n");
        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.clear_input, Some(true));
        assert_eq!(frame.commands, vec![Command::Disarm]);
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let mut src = source("{\"t\": 0.0, \"width\": 1, \"height\": 1}\nnot json\n");
        src.next_frame().unwrap();
        let err = src.next_frame().unwrap_err();
        assert!(format!("{err:#}").contains("test:2"));
    }

    #[test]
    fn unknown_command_is_an_error() {
        let mut src = source("{\"t\": 0.0, \"width\": 1, \"height\": 1, \"command\": \"dance\"}\n");
        assert!(src.next_frame().is_err());
    }

    #[test]
    fn negative_timestamp_is_an_error() {
        let mut src = source("{\"t\": -1.0, \"width\": 1, \"height\": 1}\n");
        assert!(src.next_frame().is_err());
    }
}
