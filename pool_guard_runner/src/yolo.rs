// THEORY:
// A YOLOv8 detection head emits one tensor of shape [1, 4 + classes, anchors].
// Rows 0..4 hold the box (center x, center y, width, height) in network input
// pixels and the remaining rows hold one score per class. Only class 0
// ("person" in COCO) matters here.
//
// Decoding is kept free of OpenCV so it can be exercised without a model:
// the camera source hands over the raw `f32` buffer and gets back boxes in
// frame pixels, already suppressed with greedy IoU non-maximum suppression.

use pool_guard::core_modules::detection::{BoundingBox, RawDetection};

pub const COCO_CLASSES: usize = 80;
const PERSON_CLASS: usize = 0;

#[derive(Debug, Clone, Copy)]
pub struct YoloDecoder {
    /// Minimum person score.
    pub conf: f32,
    /// Overlap above which the weaker of two boxes is dropped.
    pub iou: f32,
    /// Side of the square network input.
    pub input_size: u32,
    pub classes: usize,
}

impl YoloDecoder {
    pub fn new(conf: f32, iou: f32, input_size: u32) -> Self {
        Self {
            conf,
            iou,
            input_size,
            classes: COCO_CLASSES,
        }
    }

    fn channels(&self) -> usize {
        4 + self.classes
    }

    /// Decodes a channel-major output buffer into person boxes scaled to a
    /// `frame_width` x `frame_height` frame. Returns `None` when the buffer
    /// length does not match the head layout.
    pub fn decode(&self, output: &[f32], frame_width: u32, frame_height: u32) -> Option<Vec<RawDetection>> {
        let channels = self.channels();
        if output.is_empty() || output.len() % channels != 0 {
            return None;
        }
        let anchors = output.len() / channels;
        let sx = frame_width as f32 / self.input_size as f32;
        let sy = frame_height as f32 / self.input_size as f32;
        let max_x = frame_width.saturating_sub(1) as f32;
        let max_y = frame_height.saturating_sub(1) as f32;

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let score = output[(4 + PERSON_CLASS) * anchors + i];
            if score < self.conf {
                continue;
            }
            let cx = output[i];
            let cy = output[anchors + i];
            let w = output[2 * anchors + i];
            let h = output[3 * anchors + i];

            let x1 = ((cx - w / 2.0) * sx).clamp(0.0, max_x);
            let y1 = ((cy - h / 2.0) * sy).clamp(0.0, max_y);
            let x2 = ((cx + w / 2.0) * sx).clamp(0.0, max_x);
            let y2 = ((cy + h / 2.0) * sy).clamp(0.0, max_y);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }
            candidates.push(RawDetection::new(
                BoundingBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32),
                score,
            ));
        }

        Some(non_max_suppression(candidates, self.iou))
    }
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x2.min(b.x2) as i64 - a.x1.max(b.x1) as i64).max(0);
    let iy = (a.y2.min(b.y2) as i64 - a.y1.max(b.y1) as i64).max(0);
    let inter = (ix * iy) as f32;
    let union = (a.area() + b.area()) as f32 - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Greedy NMS, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| iou(&candidate.bbox, &kept.bbox) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}
