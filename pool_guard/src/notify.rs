//! Alert delivery.
//!
//! A [`Notifier`] receives one [`AlertPayload`] per accepted alarm. Network
//! transports (webhooks, message buses) plug in behind the same trait; this
//! crate ships a tracing sink and a JSON-lines sink over any writer. Alerts
//! are delivered and forgotten; nothing here keeps a history.

use crate::core_modules::arbitrator::FireEvent;
use crate::core_modules::detection::BoundingBox;
use crate::error::NotifyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// Wire form of a [`FireEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub timestamp: DateTime<Utc>,
    /// Seconds since the session started.
    pub session_time: f64,
    pub reason: String,
    pub count: usize,
    pub boxes: Vec<BoundingBox>,
    pub frame: FrameSize,
}

impl AlertPayload {
    pub fn from_event(event: &FireEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            session_time: event.at.as_secs_f64(),
            reason: event.reason.to_string(),
            count: event.in_zone_count,
            boxes: event.boxes.clone(),
            frame: FrameSize {
                width: event.frame_width,
                height: event.frame_height,
            },
        }
    }
}

pub trait Notifier: Send {
    fn notify(&mut self, alert: &AlertPayload) -> Result<(), NotifyError>;

    fn name(&self) -> &'static str;
}

/// Writes each alert to the log at WARN level.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, alert: &AlertPayload) -> Result<(), NotifyError> {
        warn!(
            reason = %alert.reason,
            count = alert.count,
            session_time = alert.session_time,
            "ALERT: person in zone"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Writes each alert as one JSON object per line.
pub struct JsonLinesNotifier<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesNotifier<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesNotifier<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> Notifier for JsonLinesNotifier<W> {
    fn notify(&mut self, alert: &AlertPayload) -> Result<(), NotifyError> {
        serde_json::to_writer(&mut self.writer, alert)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::arbitrator::REASON_PERSON_IN_ZONE;
    use chrono::TimeZone;
    use std::time::Duration;

    fn event() -> FireEvent {
        FireEvent {
            at: Duration::from_millis(2500),
            in_zone_count: 1,
            boxes: vec![BoundingBox::new(10, 20, 110, 220)],
            frame_width: 960,
            frame_height: 540,
            reason: REASON_PERSON_IN_ZONE,
        }
    }

    #[test]
    fn payload_serializes_flat_boxes() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let payload = AlertPayload::from_event(&event(), ts);
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["reason"], "person_in_zone");
        assert_eq!(json["count"], 1);
        assert_eq!(json["session_time"], 2.5);
        assert_eq!(json["boxes"][0], serde_json::json!([10, 20, 110, 220]));
        assert_eq!(json["frame"]["width"], 960);
        assert_eq!(json["timestamp"], "2025-01-02T03:04:05Z");
    }

    #[test]
    fn jsonl_writes_one_line_per_alert() {
        let mut sink = JsonLinesNotifier::new(Vec::new());
        let payload = AlertPayload::from_event(&event(), Utc::now());
        sink.notify(&payload).unwrap();
        sink.notify(&payload).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: AlertPayload = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed, payload);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn jsonl_write_failure_is_an_error() {
        let mut sink = JsonLinesNotifier::new(BrokenPipe);
        let payload = AlertPayload::from_event(&event(), Utc::now());
        assert!(sink.notify(&payload).is_err());
    }
}
