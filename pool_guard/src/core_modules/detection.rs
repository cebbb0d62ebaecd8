// THEORY:
// The `detection` module defines the per-frame observations the guard reasons
// about, and the narrow interface through which an external person detector
// supplies them.
//
// Key architectural principles:
// 1.  **Ephemeral Data**: A `Detection` lives for exactly one frame. Nothing in
//     the system keeps detections across frames; there is no identity tracking.
// 2.  **Detector as a Collaborator**: The detector's internals (model weights,
//     inference backend, class filtering) are not our concern. We only require
//     that boxes are expressed in the same pixel space as the zone polygon.
// 3.  **Reference Point**: A detection is reduced to the integer center of its
//     bounding box when testing zone membership.

use crate::core_modules::geometry::Point;
use serde::{Deserialize, Serialize};

/// An axis-aligned box in frame pixel coordinates. Serialized as
/// `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Integer center, rounded toward negative infinity.
    pub fn center(&self) -> Point {
        let cx = (self.x1 as i64 + self.x2 as i64).div_euclid(2);
        let cy = (self.y1 as i64 + self.y2 as i64).div_euclid(2);
        Point::new(cx as i32, cy as i32)
    }

    /// Area in square pixels. Inverted boxes have zero area.
    pub fn area(&self) -> i64 {
        let w = (self.x2 as i64 - self.x1 as i64).max(0);
        let h = (self.y2 as i64 - self.y1 as i64).max(0);
        w * h
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// What the external detector reports for one person in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    #[serde(rename = "conf")]
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }
}

/// A detection after zone classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Cached `bbox.area()`.
    pub area: i64,
    /// Whether the box center lies inside the guarded zone.
    pub in_zone: bool,
}

impl Detection {
    pub fn new(raw: RawDetection, in_zone: bool) -> Self {
        Self {
            bbox: raw.bbox,
            confidence: raw.confidence,
            area: raw.bbox.area(),
            in_zone,
        }
    }
}

/// A source of person detections for a single frame.
pub trait Detector {
    type Frame;
    type Error: std::fmt::Display;

    fn detect(&mut self, frame: &Self::Frame) -> Result<Vec<RawDetection>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_area() {
        let b = BoundingBox::new(2, 4, 9, 10);
        assert_eq!(b.center(), Point::new(5, 7));
        assert_eq!(b.area(), 42);
    }

    #[test]
    fn inverted_box_has_no_area() {
        assert_eq!(BoundingBox::new(10, 10, 4, 20).area(), 0);
    }

    #[test]
    fn raw_detection_reads_replay_layout() {
        let d: RawDetection = serde_json::from_str(r#"{"bbox": [1, 2, 3, 4], "conf": 0.75}"#).unwrap();
        assert_eq!(d.bbox, BoundingBox::new(1, 2, 3, 4));
        assert_eq!(d.confidence, 0.75);
    }
}
