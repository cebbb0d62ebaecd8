// THEORY:
// The `Arbitrator` is the decision layer of the guard. Every frame it folds
// four inputs into one answer, "fire now or not":
//
// 1.  **Containment**: is any detection's center inside the zone?
// 2.  **Arm State**: is the guard armed? The flag belongs to the caller and is
//     read fresh every frame.
// 3.  **Cooldown**: has enough time passed since the last alarm?
// 4.  **Dwell**: has the zone been continuously occupied long enough?
//
// The order matters. The cooldown is checked *before* the dwell timer is fed,
// and any frame that fails the first three checks resets the dwell timer. A
// person who stays in the zone while the cooldown is running therefore starts
// a fresh dwell run once the gate reopens, unless no frame was observed while
// the gate was closed. The arbitrator owns no I/O; it is a pure reducer over
// one frame of input.

use crate::core_modules::cooldown::CooldownGate;
use crate::core_modules::detection::{BoundingBox, Detection, RawDetection};
use crate::core_modules::dwell::DwellTimer;
use crate::core_modules::geometry::Polygon;
use std::time::Duration;

/// Reason tag attached to every alarm raised by the arbitrator.
pub const REASON_PERSON_IN_ZONE: &str = "person_in_zone";

/// Everything a notification sink needs to know about one alarm.
#[derive(Debug, Clone, PartialEq)]
pub struct FireEvent {
    /// Session time at which the alarm was raised.
    pub at: Duration,
    pub in_zone_count: usize,
    /// Boxes of the detections that were inside the zone.
    pub boxes: Vec<BoundingBox>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub reason: &'static str,
}

/// Per-frame alarm decision over a single guarded zone.
pub struct Arbitrator {
    zone: Polygon,
    dwell: DwellTimer,
    cooldown: CooldownGate,
}

impl Arbitrator {
    pub fn new(zone: Polygon, dwell_threshold: Duration, cooldown_interval: Duration) -> Self {
        Self {
            zone,
            dwell: DwellTimer::new(dwell_threshold),
            cooldown: CooldownGate::new(cooldown_interval),
        }
    }

    /// Tags each raw detection with whether its box center is in the zone.
    pub fn classify<I>(&self, raw: I) -> Vec<Detection>
    where
        I: IntoIterator<Item = RawDetection>,
    {
        raw.into_iter()
            .map(|d| Detection::new(d, self.zone.contains(d.bbox.center())))
            .collect()
    }

    /// Runs one frame of arbitration. Returns the alarm to raise, if any.
    pub fn evaluate(
        &mut self,
        armed: bool,
        detections: &[Detection],
        frame_width: u32,
        frame_height: u32,
        now: Duration,
    ) -> Option<FireEvent> {
        let any_in_zone = detections.iter().any(|d| d.in_zone);

        if armed && any_in_zone && self.cooldown.ready(now) {
            if !self.dwell.update(now, true) {
                return None;
            }

            let boxes: Vec<BoundingBox> = detections.iter().filter(|d| d.in_zone).map(|d| d.bbox).collect();
            self.cooldown.mark(now);
            Some(FireEvent {
                at: now,
                in_zone_count: boxes.len(),
                boxes,
                frame_width,
                frame_height,
                reason: REASON_PERSON_IN_ZONE,
            })
        } else {
            self.dwell.update(now, false);
            None
        }
    }

    pub fn zone(&self) -> &Polygon {
        &self.zone
    }

    pub fn dwell(&self) -> &DwellTimer {
        &self.dwell
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Point;

    const W: u32 = 640;
    const H: u32 = 480;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn unit_square_arbitrator(dwell_s: u64, cooldown_s: u64) -> Arbitrator {
        let zone = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(0, 10),
            Point::new(10, 10),
            Point::new(10, 0),
        ])
        .unwrap();
        Arbitrator::new(zone, Duration::from_secs(dwell_s), Duration::from_secs(cooldown_s))
    }

    fn person_at_center(arb: &Arbitrator) -> Vec<Detection> {
        arb.classify([RawDetection::new(BoundingBox::new(3, 3, 7, 7), 0.9)])
    }

    /// Feeds frames every `step_ms` over `[from_ms, to_ms]` and returns the
    /// fire times in milliseconds.
    fn run(arb: &mut Arbitrator, armed: bool, present: bool, from_ms: u64, to_ms: u64, step_ms: u64) -> Vec<u64> {
        let detections = if present { person_at_center(arb) } else { Vec::new() };
        let mut fired = Vec::new();
        let mut t = from_ms;
        while t <= to_ms {
            if let Some(event) = arb.evaluate(armed, &detections, W, H, ms(t)) {
                fired.push(event.at.as_millis() as u64);
            }
            t += step_ms;
        }
        fired
    }

    #[test]
    fn classify_uses_box_center() {
        let arb = unit_square_arbitrator(2, 5);
        let tagged = arb.classify([
            RawDetection::new(BoundingBox::new(3, 3, 7, 7), 0.9),
            RawDetection::new(BoundingBox::new(8, 8, 30, 30), 0.8),
            RawDetection::new(BoundingBox::new(-10, 0, 10, 4), 0.7),
        ]);
        assert!(tagged[0].in_zone);
        assert!(!tagged[1].in_zone);
        // Center (0, 2) sits on the left edge.
        assert!(tagged[2].in_zone);
    }

    #[test]
    fn continuous_presence_fires_once_at_dwell() {
        let mut arb = unit_square_arbitrator(2, 5);
        let fired = run(&mut arb, true, true, 0, 3000, 100);
        assert_eq!(fired, vec![2000]);
    }

    #[test]
    fn disarmed_never_fires() {
        let mut arb = unit_square_arbitrator(2, 5);
        let fired = run(&mut arb, false, true, 0, 20_000, 100);
        assert!(fired.is_empty());
        assert!(!arb.dwell().is_accruing());
    }

    #[test]
    fn interrupted_presence_never_fires() {
        let mut arb = unit_square_arbitrator(2, 5);
        let mut fired = run(&mut arb, true, true, 0, 1000, 100);
        fired.extend(run(&mut arb, true, false, 1100, 2000, 100));
        fired.extend(run(&mut arb, true, true, 2100, 3100, 100));
        assert!(fired.is_empty());
    }

    #[test]
    fn second_fire_inside_cooldown_is_suppressed() {
        let mut arb = unit_square_arbitrator(2, 5);
        assert_eq!(run(&mut arb, true, true, 0, 2000, 100), vec![2000]);

        // Leave, then return long enough to satisfy dwell again, still inside cooldown.
        run(&mut arb, true, false, 2100, 2200, 100);
        let fired = run(&mut arb, true, true, 2300, 6900, 100);
        assert!(fired.is_empty());
    }

    #[test]
    fn fire_immediately_when_cooldown_expires_with_dwell_satisfied() {
        let mut arb = unit_square_arbitrator(2, 5);
        let detections = person_at_center(&arb);

        assert!(arb.evaluate(true, &detections, W, H, ms(0)).is_none());
        assert!(arb.evaluate(true, &detections, W, H, ms(2000)).is_some());

        // No frame observed while the gate was closed; the dwell run is intact.
        let second = arb.evaluate(true, &detections, W, H, ms(7000));
        assert_eq!(second.map(|e| e.at), Some(ms(7000)));
    }

    #[test]
    fn frames_during_cooldown_restart_dwell() {
        let mut arb = unit_square_arbitrator(2, 5);
        assert_eq!(run(&mut arb, true, true, 0, 2000, 100), vec![2000]);

        // Continuous presence: the gate reopens at 7000 and a new dwell run
        // starts there, so the next alarm lands at 9000.
        let fired = run(&mut arb, true, true, 2100, 12_000, 100);
        assert_eq!(fired, vec![9000]);
    }

    #[test]
    fn fire_event_carries_only_in_zone_boxes() {
        let mut arb = unit_square_arbitrator(1, 0);
        let detections = arb.classify([
            RawDetection::new(BoundingBox::new(3, 3, 7, 7), 0.9),
            RawDetection::new(BoundingBox::new(100, 100, 200, 200), 0.9),
            RawDetection::new(BoundingBox::new(1, 1, 5, 5), 0.6),
        ]);

        assert!(arb.evaluate(true, &detections, W, H, ms(0)).is_none());
        let event = arb.evaluate(true, &detections, W, H, ms(1000)).unwrap();

        assert_eq!(event.in_zone_count, 2);
        assert_eq!(event.boxes, vec![BoundingBox::new(3, 3, 7, 7), BoundingBox::new(1, 1, 5, 5)]);
        assert_eq!((event.frame_width, event.frame_height), (W, H));
        assert_eq!(event.reason, REASON_PERSON_IN_ZONE);
    }

    #[test]
    fn detections_outside_zone_reset_dwell() {
        let mut arb = unit_square_arbitrator(2, 5);
        let inside = person_at_center(&arb);
        let outside = arb.classify([RawDetection::new(BoundingBox::new(50, 50, 60, 60), 0.9)]);

        arb.evaluate(true, &inside, W, H, ms(0));
        arb.evaluate(true, &outside, W, H, ms(1500));
        assert!(!arb.dwell().is_accruing());
        assert!(arb.evaluate(true, &inside, W, H, ms(2000)).is_none());
    }
}
